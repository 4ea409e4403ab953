use regex::Regex;
use std::sync::LazyLock;

const ACTIVE_TAGS: [&str; 6] = ["script", "style", "noscript", "iframe", "object", "embed"];

// regex has no backreferences, so one pattern per element
static ELEMENT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ACTIVE_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("static regex")
        })
        .collect()
});

// unclosed, self-closing or orphaned closing tags left after element removal
static STRAY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)</?(?:{})\b[^>]*>", ACTIVE_TAGS.join("|"))).expect("static regex")
});

static EVENT_HANDLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("static regex")
});

static SCRIPT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(href|src|action|formaction|xlink:href)(\s*=\s*["']?)\s*(?:javascript|vbscript|data):"#)
        .expect("static regex")
});

/// Remove executable content from an HTML document so it can be displayed.
pub fn strip_active_content(html: &str) -> String {
    let mut out = html.to_string();
    for re in ELEMENT_RES.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    out = STRAY_TAG_RE.replace_all(&out, "").into_owned();
    out = EVENT_HANDLER_RE.replace_all(&out, "").into_owned();
    SCRIPT_URL_RE
        .replace_all(&out, "${1}${2}about:blank#")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_script_and_style_elements() {
        let html = "<html><head><STYLE>body{}</STYLE><script type=\"x\">\nalert(1)\n</script ></head>\
                    <body><p>keep</p><noscript>n</noscript></body></html>";
        assert_eq!(
            strip_active_content(html),
            "<html><head></head><body><p>keep</p></body></html>"
        );
    }

    #[test]
    fn removes_unclosed_and_embedded_tags() {
        assert_eq!(
            strip_active_content("<p>a</p><script src=//evil.js><iframe src=x /><embed src=y>"),
            "<p>a</p>"
        );
    }

    #[test]
    fn removes_inline_handlers_and_script_urls() {
        assert_eq!(
            strip_active_content(r#"<img src="a.png" onerror="alert(1)"><a href="javascript:alert(2)" onclick='x'>go</a>"#),
            r#"<img src="a.png"><a href="about:blank#alert(2)">go</a>"#
        );
    }

    #[test]
    fn plain_markup_is_untouched() {
        let html = "<article><h1>Title</h1><p>Body &amp; text</p></article>";
        assert_eq!(strip_active_content(html), html);
    }
}
