//! # confvol-template
//!
//! Configuration templates rendered against store data.
//!
//! The template language is the familiar `{{ }}` action syntax: field
//! access on a context value, pipelines, `if`/`range`/`with` blocks and a
//! small set of functions. Three functions reach into the key-value store:
//!
//! ```text
//! listen {{ StoreGet "/app/port" | RemoveNewline }}
//! {{- range StoreList "/app/upstreams/" }}
//! upstream {{ . }}
//! {{- end }}
//! ```
//!
//! A template without a store is valid; store lookups then resolve to empty
//! values, which keeps templates testable in isolation.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use confvol_store::InMemoryStore;
//! use confvol_template::ConfTemplate;
//!
//! let store = InMemoryStore::with_entries([("/app/port", "8080")]);
//! let template = ConfTemplate::new(Some(Arc::new(store)));
//!
//! let out = template.parse(r#"port={{ StoreGet "/app/port" }}"#, &()).unwrap();
//! assert_eq!(out, "port=8080");
//! ```

use confvol_store::SharedStore;
use serde::Serialize;
use serde_json::Value;

mod error;
mod exec;
mod funcs;
mod lex;
mod parse;
mod value;

pub use error::Error;
pub use funcs::Helper;

use exec::Exec;
use funcs::Funcs;

/// Name reported in template error messages.
pub const TEMPLATE_NAME: &str = "conf_template";

/// A configuration template engine bound to an optional store.
pub struct ConfTemplate {
    funcs: Funcs,
}

impl ConfTemplate {
    /// Create an engine. `None` means store helpers resolve to empty values.
    pub fn new(store: Option<SharedStore>) -> Self {
        Self {
            funcs: Funcs::new(store),
        }
    }

    /// Register an additional template function, replacing any existing
    /// function of the same name.
    pub fn with_helper<F>(mut self, name: impl Into<String>, helper: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.funcs.insert(name, Box::new(helper));
        self
    }

    /// Parse `text` and expand it against `context`.
    ///
    /// Pass `&()` for no context. On error no partial output is returned.
    pub fn parse<C: Serialize + ?Sized>(&self, text: &str, context: &C) -> Result<String, Error> {
        let lexemes = lex::lex(TEMPLATE_NAME, text)?;
        let nodes = parse::parse(TEMPLATE_NAME, text, lexemes, |name: &str| self.funcs.contains(name))?;
        let data = serde_json::to_value(context)?;
        Exec::new(TEMPLATE_NAME, text, &self.funcs, data).run(&nodes)
    }
}

impl Default for ConfTemplate {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confvol_store::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn with_store(entries: &[(&str, &str)]) -> ConfTemplate {
        let store = InMemoryStore::with_entries(entries.iter().map(|(k, v)| (*k, v.to_string())));
        ConfTemplate::new(Some(Arc::new(store)))
    }

    fn render(template: &ConfTemplate, text: &str) -> String {
        match template.parse(text, &()) {
            Ok(out) => out,
            Err(e) => panic!("render of {:?} failed: {}", text, e),
        }
    }

    #[test]
    fn unclosed_action_is_syntax_error() {
        let template = with_store(&[]);
        let result = template.parse("{{ ", &());
        assert!(matches!(result, Err(Error::Syntax { line: 1, .. })));
        assert_eq!(result.unwrap_or_default(), "");
    }

    #[test]
    fn text_only_template() {
        let template = with_store(&[]);
        assert_eq!(render(&template, "☂textonly☂template☂"), "☂textonly☂template☂");
    }

    #[test]
    fn uses_template_context() {
        #[derive(Serialize)]
        #[allow(non_snake_case)]
        struct Ctx {
            Context: String,
        }

        let template = with_store(&[]);
        let out = template
            .parse(
                "{{ .Context }}",
                &Ctx {
                    Context: "qwerty".to_string(),
                },
            )
            .unwrap();
        assert_eq!(out, "qwerty");
    }

    #[test]
    fn missing_context_field_is_exec_error() {
        let template = ConfTemplate::default();
        assert!(matches!(
            template.parse("{{ .Missing }}", &json!({"Other": 1})),
            Err(Error::Exec { .. })
        ));
        assert!(matches!(
            template.parse("{{ .Missing }}", &()),
            Err(Error::Exec { .. })
        ));
    }

    #[test]
    fn store_get_without_store_is_empty() {
        let template = ConfTemplate::new(None);
        assert_eq!(render(&template, r#"{{StoreGet "/foo/bar/buzz"}}"#), "");
    }

    #[test]
    fn store_get_missing_key_is_empty() {
        let template = with_store(&[]);
        assert_eq!(render(&template, r#"{{StoreGet "/foo/bar/buzz"}}"#), "");
    }

    #[test]
    fn store_get_resolves_value() {
        let template = with_store(&[("/foo/bar/buzz", "qwerty")]);
        assert_eq!(render(&template, r#"{{StoreGet "/foo/bar/buzz"}}"#), "qwerty");
    }

    #[test]
    fn store_list_ranges_over_values() {
        let template = with_store(&[("/foo/bar/A", "qwertyA")]);
        assert_eq!(
            render(&template, r#"{{range StoreList "/foo/bar/"}}{{ . }}{{end}}"#),
            "qwertyA"
        );
    }

    #[test]
    fn store_list_keeps_backend_order() {
        let template = with_store(&[("/h/1", "a"), ("/h/2", "b"), ("/h/3", "c")]);
        assert_eq!(
            render(&template, r#"{{range $i, $v := StoreList "/h/"}}{{$i}}={{$v}};{{end}}"#),
            "0=a;1=b;2=c;"
        );
    }

    #[test]
    fn remove_newline_in_pipeline() {
        let template = with_store(&[("/app/port", "8080\n")]);
        assert_eq!(
            render(&template, r#"port={{ StoreGet "/app/port" | RemoveNewline }};"#),
            "port=8080;"
        );
    }

    #[test]
    fn conditionals() {
        let template = with_store(&[("/flags/tls", "on")]);
        let text = r#"{{ if eq (StoreGet "/flags/tls") "on" }}tls{{ else if StoreGet "/flags/plain" }}plain{{ else }}none{{ end }}"#;
        assert_eq!(render(&template, text), "tls");

        let empty = with_store(&[]);
        assert_eq!(render(&empty, text), "none");
    }

    #[test]
    fn range_else_on_empty() {
        let template = with_store(&[]);
        assert_eq!(
            render(&template, r#"{{range StoreList "/none/"}}x{{else}}empty{{end}}"#),
            "empty"
        );
    }

    #[test]
    fn with_rebinds_dot() {
        let template = ConfTemplate::default();
        let out = template
            .parse(
                "{{with .Db}}{{.Host}}:{{.Port}}{{end}}",
                &json!({"Db": {"Host": "db", "Port": 5432}}),
            )
            .unwrap();
        assert_eq!(out, "db:5432");
    }

    #[test]
    fn trim_markers_and_comments() {
        let template = ConfTemplate::default();
        let out = template
            .parse("a {{- /* dropped */ -}} b\n{{- \"c\" }}", &())
            .unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn variables_and_root() {
        let template = ConfTemplate::default();
        let out = template
            .parse(
                "{{ $name := .Name }}{{ range .Items }}{{ $name }}-{{ . }}-{{ $.Suffix }} {{ end }}",
                &json!({"Name": "n", "Items": [1, 2], "Suffix": "s"}),
            )
            .unwrap();
        assert_eq!(out, "n-1-s n-2-s ");
    }

    #[test]
    fn helper_misuse_is_exec_error() {
        let template = ConfTemplate::default();
        let err = template.parse("{{ StoreGet 1 }}", &()).unwrap_err();
        assert!(matches!(err, Error::Exec { .. }));
        assert!(format!("{}", err).contains("error calling StoreGet"));
    }

    #[test]
    fn custom_helper() {
        let template = ConfTemplate::default().with_helper("upper", |args: &[Value]| {
            let s = args.first().and_then(Value::as_str).ok_or("want a string")?;
            Ok(Value::String(s.to_uppercase()))
        });
        assert_eq!(render(&template, r#"{{ "abc" | upper }}"#), "ABC");
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let template = ConfTemplate::default();
        let text = format!("{{{{ {}1{} }}}}", "(".repeat(50_000), ")".repeat(50_000));
        let err = template.parse(&text, &()).unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 1, .. }), "{}", err);
    }

    #[test]
    fn non_utf8_store_value_fails_execution() {
        let store = InMemoryStore::new();
        store.insert("/bin", vec![0xff, b'a']);
        let template = ConfTemplate::new(Some(Arc::new(store)));
        let err = template.parse(r#"{{ StoreGet "/bin" }}"#, &()).unwrap_err();
        assert!(matches!(err, Error::Exec { .. }), "{}", err);
    }
}
