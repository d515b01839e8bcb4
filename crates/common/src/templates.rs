use error_stack::{Report, ResultExt};
use handlebars::Handlebars;
use serde_json::json;

use crate::error::WfeError;

pub const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>ACME certificate authority</title>
</head>
<body>
    <p>
        This is an ACME certificate authority front end (version {{version}}).
        New registrations are accepted at <a href="{{new_reg}}">{{new_reg}}</a>.
    </p>
    {{#if terms}}
    <p>Terms of service: <a href="{{terms}}">{{terms}}</a></p>
    {{/if}}
</body>
</html>
"#;

/// Render the index page.
///
/// # Errors
///
/// Returns an internal error if the template fails to render.
pub fn render_index(new_reg_url: &str, terms_url: Option<&str>) -> Result<String, Report<WfeError>> {
    let handlebars = Handlebars::new();
    let data = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "new_reg": new_reg_url,
        "terms": terms_url,
    });

    handlebars
        .render_template(INDEX_TEMPLATE, &data)
        .change_context(WfeError::internal("Failed to render index page"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_links_new_registration() {
        let html = render_index("https://ca.example/acme/new-reg", None).expect("should render");
        assert!(html.contains(r#"<a href="https://ca.example/acme/new-reg">"#));
        assert!(!html.contains("Terms of service"));
    }

    #[test]
    fn index_links_terms_when_published() {
        let html = render_index(
            "https://ca.example/acme/new-reg",
            Some("https://ca.example/terms"),
        )
        .expect("should render");
        assert!(html.contains(r#"<a href="https://ca.example/terms">"#));
    }
}
