//! Source instrumentation that makes blocking reads observable.
//!
//! The injector prepends a fixed preamble to the user's C source. The
//! preamble disables stdio buffering and redefines the blocking-input
//! primitives so each call first writes the marker token to stdout:
//!
//! ```text
//! preamble (hooks + #line 1 "source.c")
//! user source, unchanged
//! ```

use crate::error::{Error, Result};

/// Marker token written before every hooked read.
pub const DEFAULT_MARKER: &str = "<<__REQ__>>";

/// Comment directive carrying per-submission compiler flags.
pub const CFLAGS_DIRECTIVE: &str = "//%cflags";

/// A blocking-input primitive redefined by the preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hook {
    /// Name of the primitive.
    pub name: &'static str,

    /// Macro definition. `@TRIGGER@` is replaced by the marker function.
    pub definition: &'static str,
}

/// Primitives hooked by default.
pub const STDIN_HOOKS: &[Hook] = &[
    Hook {
        name: "scanf",
        definition: "#define scanf(...) (@TRIGGER@(), scanf(__VA_ARGS__))",
    },
    Hook {
        name: "getchar",
        definition: "#define getchar() (@TRIGGER@(), getchar())",
    },
    Hook {
        name: "fgets",
        definition: "#define fgets(s, n, stream) ((stream) == stdin ? @TRIGGER@() : (void)0, fgets(s, n, stream))",
    },
];

const TRIGGER_FN: &str = "ceres_request_input_";

/// Instrumented source ready for the compiler.
#[derive(Debug, Clone)]
pub struct InstrumentedSource {
    /// Preamble followed by the user source.
    pub text: String,

    /// Flags collected from `//%cflags` directives.
    pub extra_flags: Vec<String>,
}

/// Builds instrumented source from user source.
#[derive(Debug, Clone)]
pub struct Instrumenter {
    marker: String,
    hooks: Vec<Hook>,
    source_name: String,
}

impl Instrumenter {
    /// Create an instrumenter with the default hooks.
    ///
    /// The marker must be non-empty and fit on one line.
    pub fn new(marker: impl Into<String>, source_name: impl Into<String>) -> Result<Self> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(Error::InvalidMarker("marker is empty".to_string()));
        }
        if marker.contains(['\n', '\r', '\0']) {
            return Err(Error::InvalidMarker(format!(
                "marker {marker:?} contains a line break or NUL"
            )));
        }

        Ok(Self {
            marker,
            hooks: STDIN_HOOKS.to_vec(),
            source_name: source_name.into(),
        })
    }

    /// The marker token.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The hooked primitives.
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Render the preamble.
    pub fn preamble(&self) -> String {
        let mut code = String::new();

        code.push_str("#include <stdio.h>\n");
        code.push_str("#include <stdlib.h>\n");
        code.push_str("#ifdef _WIN32\n#include <windows.h>\n#endif\n\n");

        code.push_str("static void __attribute__((constructor)) ceres_init_(void) {\n");
        code.push_str("    setvbuf(stdout, NULL, _IONBF, 0);\n");
        code.push_str("    setvbuf(stderr, NULL, _IONBF, 0);\n");
        code.push_str("#ifdef _WIN32\n    SetConsoleOutputCP(65001);\n#endif\n");
        code.push_str("}\n\n");

        code.push_str(&format!(
            "static void __attribute__((unused)) {TRIGGER_FN}(void) {{\n"
        ));
        code.push_str(&format!(
            "    fputs(\"{}\", stdout);\n",
            escape_c_string(&self.marker)
        ));
        code.push_str("    fflush(stdout);\n");
        code.push_str("}\n\n");

        for hook in &self.hooks {
            code.push_str(&hook.definition.replace("@TRIGGER@", TRIGGER_FN));
            code.push('\n');
        }

        code.push_str(&format!(
            "#line 1 \"{}\"\n",
            escape_c_string(&self.source_name)
        ));
        code
    }

    /// Instrument user source.
    pub fn instrument(&self, source: &str) -> InstrumentedSource {
        let mut text = self.preamble();
        text.push_str(source);
        if !source.ends_with('\n') {
            text.push('\n');
        }

        InstrumentedSource {
            text,
            extra_flags: extract_cflags(source),
        }
    }
}

/// Collect compiler flags from `//%cflags` comment lines.
pub fn extract_cflags(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| line.trim().strip_prefix(CFLAGS_DIRECTIVE))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

fn escape_c_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '?' => escaped.push_str("\\?"), // no trigraphs
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrumenter() -> Instrumenter {
        Instrumenter::new(DEFAULT_MARKER, "source.c").unwrap()
    }

    #[test]
    fn test_preamble_hooks_all_primitives() {
        let preamble = instrumenter().preamble();

        assert!(preamble.contains("#define scanf(...)"));
        assert!(preamble.contains("#define getchar()"));
        assert!(preamble.contains("(stream) == stdin"));
        assert!(preamble.contains("fputs(\"<<__REQ__>>\", stdout);"));
        assert!(preamble.contains("setvbuf(stdout, NULL, _IONBF, 0);"));
        assert!(!preamble.contains("@TRIGGER@"));
    }

    #[test]
    fn test_preamble_resets_line_numbers() {
        let preamble = instrumenter().preamble();
        assert!(preamble.ends_with("#line 1 \"source.c\"\n"));
    }

    #[test]
    fn test_instrument_keeps_user_source_after_preamble() {
        let source = "int main(void) { return 0; }";
        let instrumented = instrumenter().instrument(source);

        let (preamble, user) = instrumented.text.split_once("#line 1 \"source.c\"\n").unwrap();
        assert!(preamble.contains("#include <stdio.h>"));
        assert_eq!(user, "int main(void) { return 0; }\n");
        assert!(instrumented.extra_flags.is_empty());
    }

    #[test]
    fn test_extract_cflags() {
        let source = "//%cflags -lm -O2\n#include <math.h>\n  //%cflags   -Wall\nint main(void) {}\n";
        assert_eq!(extract_cflags(source), vec!["-lm", "-O2", "-Wall"]);
    }

    #[test]
    fn test_extract_cflags_ignores_plain_comments() {
        let source = "// cflags -lm\n/* //%cflags -O3 */\n";
        assert!(extract_cflags(source).is_empty());
    }

    #[test]
    fn test_marker_is_escaped() {
        let instrumenter = Instrumenter::new("<\"why?\">", "source.c").unwrap();
        let preamble = instrumenter.preamble();
        assert!(preamble.contains(r#"fputs("<\"why\?\">", stdout);"#));
    }

    #[test]
    fn test_invalid_marker() {
        assert!(matches!(
            Instrumenter::new("", "source.c"),
            Err(Error::InvalidMarker(_))
        ));
        assert!(matches!(
            Instrumenter::new("a\nb", "source.c"),
            Err(Error::InvalidMarker(_))
        ));
    }
}
