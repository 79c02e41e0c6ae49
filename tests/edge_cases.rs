use pretty_assertions::assert_eq;
use serde_json::json;
use shimmytmpl::{render, Context, Error, RenderError, Template};

// ── Edge cases around parsing, trimming and scoping ──

#[test]
fn plain_text_template_no_actions() {
    for source in ["", "Hello, world!", "line\n\n  indented\t\n", "single { brace } and }} closer"] {
        assert_eq!(render(source, &Context::Null).unwrap(), source);
    }
}

#[test]
fn empty_range_produces_empty_output() {
    let ctx = Context::from(json!({ "Items": [] }));
    assert_eq!(render("{{range .Items}}{{.Nope.Nope}}{{end}}", &ctx).unwrap(), "");
}

#[test]
fn trim_is_applied_once_and_stable() {
    let source = "{{- range .Items -}}{{.}}{{- end}}";
    let first = Template::parse(source).unwrap();
    let second = Template::parse(source).unwrap();
    assert_eq!(first.tree(), second.tree());
    assert_eq!(first, second);
}

#[test]
fn reparsing_yields_structurally_equal_trees() {
    let source = "{{if .A}}{{range .B}}{{upper .}}{{end}}{{else}}{{.C | len}}{{end}}";
    assert_eq!(Template::parse(source).unwrap(), Template::parse(source).unwrap());
}

#[test]
fn unterminated_action_never_panics() {
    for source in ["{{", "{{.Name", "a {{ b", "{{ \"}}", "ok {{.A}} {{- "] {
        let err = render(source, &Context::Null).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "{source:?}: {err}");
    }
}

#[test]
fn mismatched_blocks_are_syntax_errors() {
    for source in [
        "{{if .A}}",
        "{{range .A}}{{if .B}}{{end}}",
        "{{end}}",
        "{{else}}",
        "{{range .A}}{{else}}{{end}}",
        "{{define \"x\"}}{{end}}",
    ] {
        let err = render(source, &Context::record()).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "{source:?}: {err}");
    }
}

#[test]
fn deeply_nested_expressions_are_syntax_errors() {
    let ctx = Context::record().with("Name", "x");
    let parens = format!("{{{{{}.Name{}}}}}", "(".repeat(5000), ")".repeat(5000));
    let err = render(&parens, &ctx).unwrap_err();
    assert!(matches!(err, Error::Syntax(ref e) if e.message.contains("nested too deep")), "{err}");

    let pipes = format!("{{{{.Name{}}}}}", " | lower".repeat(5000));
    let err = render(&pipes, &ctx).unwrap_err();
    assert!(matches!(err, Error::Syntax(ref e) if e.message.contains("nested too deep")), "{err}");

    let shallow = format!("{{{{{}.Name{}}}}}", "(".repeat(100), ")".repeat(100));
    assert_eq!(render(&shallow, &ctx).unwrap(), "x");
}

#[test]
fn dot_inside_range_is_the_element() {
    let ctx = Context::from(json!({ "Rows": [{ "N": 1 }, { "N": 2 }] }));
    assert_eq!(render("{{range .Rows}}{{.N}};{{end}}", &ctx).unwrap(), "1;2;");
}

#[test]
fn root_reference_reaches_outside_range() {
    let ctx = Context::from(json!({ "Sep": "/", "Parts": ["a", "b"] }));
    assert_eq!(render("{{range .Parts}}{{.}}{{$.Sep}}{{end}}", &ctx).unwrap(), "a/b/");
}

#[test]
fn missing_field_is_an_error_not_blank() {
    let err = render("Hi {{.Name}}", &Context::record()).unwrap_err();
    assert!(
        matches!(err, Error::Render(RenderError::MissingField { ref path, offset: 3 }) if path == ".Name"),
        "{err}"
    );
}

#[test]
fn scalar_printing() {
    let ctx = Context::from(json!({ "I": 8080, "F": 2.5, "B": false, "N": null, "S": [1, "x"] }));
    assert_eq!(
        render("{{.I}}|{{.F}}|{{.B}}|{{.N}}|{{.S}}", &ctx).unwrap(),
        "8080|2.5|false||[1 x]"
    );
}

#[test]
fn special_characters_in_values_are_not_escaped() {
    let ctx = Context::record().with("Content", "Hello <world> & \"friends\"");
    assert_eq!(render("{{.Content}}", &ctx).unwrap(), "Hello <world> & \"friends\"");
}

#[test]
fn unicode_content() {
    let ctx = Context::record().with("Content", "こんにちは 🌍");
    assert_eq!(render("« {{.Content}} »", &ctx).unwrap(), "« こんにちは 🌍 »");
}

#[test]
fn string_literals_may_contain_delimiters() {
    assert_eq!(render(r#"{{print "{{" "}}"}}"#, &Context::Null).unwrap(), "{{ }}");
}

#[test]
fn templates_are_shareable_across_threads() {
    let template = Template::parse("{{range .}}{{.}}{{end}}").unwrap();
    let registry = shimmytmpl::FunctionRegistry::with_builtins();
    std::thread::scope(|s| {
        for n in 0..4 {
            let (template, registry) = (&template, &registry);
            s.spawn(move || {
                let ctx = Context::from(vec![n; 3]);
                assert_eq!(template.render(&ctx, registry).unwrap(), n.to_string().repeat(3));
            });
        }
    });
}
