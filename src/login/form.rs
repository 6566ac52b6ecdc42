//! Built-in sign-in page.

use std::fmt::Write as _;

/// Values filled into the sign-in form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub csrf: String,
    /// Where to go after a successful sign-in.
    pub uri: String,
    pub username: String,
    /// Mark the password field as rejected.
    pub invalid: bool,
}

/// Escape text for an HTML attribute value.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl LoginForm {
    pub fn render(&self, action: &str) -> String {
        let mut page = String::with_capacity(1024);
        page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n");
        page.push_str("<title>Please sign in</title>\n</head>\n<body>\n");
        let _ = writeln!(
            page,
            "<form class=\"form-signin\" method=\"post\" action=\"{}\">",
            escape(action)
        );
        let _ = writeln!(page, "<input type=\"hidden\" name=\"uri\" value=\"{}\" />", escape(&self.uri));
        let _ = writeln!(page, "<input type=\"hidden\" name=\"_csrf\" value=\"{}\" />", escape(&self.csrf));
        page.push_str("<h2>Please sign in</h2>\n");
        let _ = writeln!(
            page,
            "<input type=\"text\" id=\"username\" name=\"username\" placeholder=\"Username\" required=\"required\" autofocus=\"autofocus\" value=\"{}\" />",
            escape(&self.username)
        );
        let class = if self.invalid { "form-control is-invalid" } else { "form-control" };
        let _ = writeln!(
            page,
            "<input type=\"password\" id=\"password\" name=\"password\" class=\"{}\" placeholder=\"Password\" required=\"required\" value=\"\" />",
            class
        );
        if self.invalid {
            page.push_str("<div class=\"invalid-feedback\">Invalid username/password</div>\n");
        }
        page.push_str("<button type=\"submit\">Sign in</button>\n</form>\n</body>\n</html>\n");
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_hidden_fields() {
        let form = LoginForm {
            csrf: "tok".into(),
            uri: "/admin?a=1&b=\"2\"".into(),
            ..LoginForm::default()
        };
        let page = form.render("/login");
        assert!(page.contains("name=\"_csrf\" value=\"tok\""));
        assert!(page.contains("value=\"/admin?a=1&amp;b=&quot;2&quot;\""));
        assert!(!page.contains("is-invalid"));
    }

    #[test]
    fn marks_invalid_password() {
        let form = LoginForm {
            username: "<scott>".into(),
            invalid: true,
            ..LoginForm::default()
        };
        let page = form.render("/login");
        assert!(page.contains("is-invalid"));
        assert!(page.contains("value=\"&lt;scott&gt;\""));
    }
}
