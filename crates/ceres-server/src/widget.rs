//! HTML rendering of the input affordance.

use ceres_core::InputAffordance;

/// Render a text input that posts its value to the relay on Enter.
///
/// The post is `application/x-www-form-urlencoded` with fields `id` and
/// `value`. Once sent, the input disables itself.
pub fn render_input(affordance: &InputAffordance) -> String {
    let id = affordance.request_id.to_string();
    let url = affordance.relay_url.as_deref().unwrap_or("");
    let element_id = format!("ceres-input-{id}");

    format!(
        r#"<div class="ceres-input">
  <input type="text" id="{element_id}" placeholder="Type input and press Enter" autofocus
         style="font-family: monospace; width: 60%;" />
  <script>
    (function () {{
      const input = document.getElementById({element_js});
      input.addEventListener("keydown", function (event) {{
        if (event.key !== "Enter") return;
        input.disabled = true;
        const body = new URLSearchParams({{ id: {id_js}, value: input.value }});
        fetch({url_js}, {{ method: "POST", body: body }});
      }});
    }})();
  </script>
</div>"#,
        element_id = html_escape(&element_id),
        element_js = js_string(&element_id),
        id_js = js_string(&id),
        url_js = js_string(url),
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// A JS string literal that cannot close the surrounding script element.
fn js_string(text: &str) -> String {
    serde_json::to_string(text)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
}
