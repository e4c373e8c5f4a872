use crate::param::STATUS_CODES;

/// 简易 HTML 页面构建器，用于 HTML 族错误响应体。
pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => match STATUS_CODES.get(&code) {
                Some(d) => *d,
                None => "Unknown",
            },
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r"<!DOCTYPE html>
<html>
<head>
<meta charset='utf-8'>
<title>{}</title>
<style>{}</style>
</head>
<body>
{}
</body>
</html>",
            self.title, self.css, self.body
        )
    }
}
