//! XML response model and command helpers.
//!
//! Every controller RPC answers with a `<response status="...">` document.
//! [`XmlResponse`] keeps the raw body (validated once on construction) and
//! answers path queries against it, so callers never hold a borrowed DOM
//! across an `.await`.
//!
//! Paths are slash-separated element names relative to the `<response>`
//! root, e.g. `result/local-info/state`.

use roxmltree::{Document, Node};

use crate::error::{XapiError, XapiResult};

/// A parsed `<response>` document from a controller node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlResponse {
    host: String,
    body: String,
}

impl XmlResponse {
    /// Validate `body` as a controller response received from `host`.
    pub fn parse(host: &str, body: impl Into<String>) -> XapiResult<Self> {
        let body = body.into();
        {
            let doc = Document::parse(&body)
                .map_err(|e| XapiError::parse(host, format!("invalid XML: {e}")))?;
            let root = doc.root_element().tag_name().name();
            if root != "response" {
                return Err(XapiError::parse(
                    host,
                    format!("expected <response> root, got <{root}>"),
                ));
            }
        }
        Ok(XmlResponse {
            host: host.to_string(),
            body,
        })
    }

    /// Host that produced this response.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The `status` attribute of the root element.
    pub fn status(&self) -> Option<String> {
        self.with_root(|root| root.attribute("status").map(str::to_string))
            .flatten()
    }

    /// The `code` attribute of the root element.
    pub fn code(&self) -> Option<String> {
        self.with_root(|root| root.attribute("code").map(str::to_string))
            .flatten()
    }

    /// `true` unless the controller flagged the response as an error.
    pub fn is_success(&self) -> bool {
        self.status().as_deref() != Some("error")
    }

    /// Whether at least one element exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.with_root(|root| !select(root, path).is_empty())
            .unwrap_or(false)
    }

    /// Text of the first element at `path`, trimmed.
    ///
    /// Elements wrapping `<line>` children yield the lines joined by `\n`.
    pub fn text(&self, path: &str) -> Option<String> {
        self.with_root(|root| select(root, path).first().map(|n| node_text(*n)))
            .flatten()
    }

    /// Text of every element at `path`, in document order.
    pub fn texts(&self, path: &str) -> Vec<String> {
        self.with_root(|root| {
            select(root, path)
                .into_iter()
                .map(node_text)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
    }

    /// Like [`text`](Self::text) but a missing element is a parse error.
    pub fn require_text(&self, path: &str) -> XapiResult<String> {
        self.text(path)
            .ok_or_else(|| XapiError::parse(&self.host, format!("missing element {path}")))
    }

    /// The controller's own message for this response (first `<msg>` anywhere).
    pub fn message(&self) -> Option<String> {
        self.with_root(|root| {
            root.descendants()
                .find(|n| n.is_element() && n.tag_name().name() == "msg")
                .map(node_text)
        })
        .flatten()
        .filter(|m| !m.is_empty())
    }

    /// Turn an error-status response into [`XapiError::Api`].
    pub fn into_checked(self) -> XapiResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(XapiError::Api {
            code: self.code(),
            message: self
                .message()
                .unwrap_or_else(|| "request failed without a message".to_string()),
            host: self.host,
        })
    }

    fn with_root<T>(&self, f: impl FnOnce(Node) -> T) -> Option<T> {
        Document::parse(&self.body)
            .ok()
            .map(|doc| f(doc.root_element()))
    }
}

fn select<'a, 'input>(root: Node<'a, 'input>, path: &str) -> Vec<Node<'a, 'input>> {
    let mut current = vec![root];
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        current = current
            .iter()
            .flat_map(|n| {
                n.children()
                    .filter(move |c| c.is_element() && c.tag_name().name() == segment)
            })
            .collect();
    }
    current
}

fn node_text(node: Node) -> String {
    let lines: Vec<String> = node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "line")
        .map(collect_text)
        .collect();
    if lines.is_empty() {
        collect_text(node)
    } else {
        lines.join("\n")
    }
}

fn collect_text(node: Node) -> String {
    node.descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Escape a value for use inside XML text or a quoted attribute.
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
}

fn tokenize(cmd: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = cmd.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut value = String::new();
            for v in chars.by_ref() {
                if v == '"' {
                    break;
                }
                value.push(v);
            }
            tokens.push(Token::Quoted(value));
        } else {
            let mut word = String::new();
            while let Some(&w) = chars.peek() {
                if w.is_whitespace() || w == '"' {
                    break;
                }
                word.push(w);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    tokens
}

/// Convert a CLI-style operational command into its XML form.
///
/// `show system info` becomes `<show><system><info></info></system></show>`.
/// A quoted token is the text value of the element before it, so
/// `show jobs id "4"` becomes `<show><jobs><id>4</id></jobs></show>`.
/// Commands that already start with `<` are returned unchanged.
pub fn op_command_xml(cmd: &str) -> String {
    let cmd = cmd.trim();
    if cmd.starts_with('<') {
        return cmd.to_string();
    }

    let mut open: Vec<String> = Vec::new();
    let mut out = String::new();
    for token in tokenize(cmd) {
        match token {
            Token::Word(word) => {
                out.push_str(&format!("<{word}>"));
                open.push(word);
            }
            Token::Quoted(value) => {
                out.push_str(&escape_xml(&value));
                if let Some(word) = open.pop() {
                    out.push_str(&format!("</{word}>"));
                }
            }
        }
    }
    while let Some(word) = open.pop() {
        out.push_str(&format!("</{word}>"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HA_ACTIVE: &str = r#"<response status="success"><result>
        <enabled>yes</enabled>
        <local-info><state>active</state><priority>100</priority></local-info>
        <peer-info><state>passive</state></peer-info>
    </result></response>"#;

    #[test]
    fn test_text_follows_path_from_root() {
        let resp = XmlResponse::parse("pano1", HA_ACTIVE).unwrap();
        assert_eq!(resp.text("result/local-info/state").as_deref(), Some("active"));
        assert_eq!(resp.text("result/peer-info/state").as_deref(), Some("passive"));
        assert_eq!(resp.text("./result/local-info/state").as_deref(), Some("active"));
        assert!(resp.text("result/local-info/missing").is_none());
    }

    #[test]
    fn test_require_text_missing_is_parse_error() {
        let resp = XmlResponse::parse(
            "pano1",
            r#"<response status="success"><result><enabled>no</enabled></result></response>"#,
        )
        .unwrap();
        let err = resp.require_text("result/local-info/state").unwrap_err();
        assert!(matches!(err, XapiError::Parse { .. }));
        assert!(err.to_string().contains("result/local-info/state"));
    }

    #[test]
    fn test_invalid_xml_rejected() {
        let err = XmlResponse::parse("pano1", "<response><result>").unwrap_err();
        assert!(matches!(err, XapiError::Parse { .. }));
    }

    #[test]
    fn test_wrong_root_rejected() {
        let err = XmlResponse::parse("pano1", "<html><body/></html>").unwrap_err();
        assert!(err.to_string().contains("<html>"));
    }

    #[test]
    fn test_exists_detects_structural_presence() {
        let present = XmlResponse::parse(
            "pano1",
            r#"<response status="success" code="19"><result total-count="1" count="1"><entry name="SN001"/></result></response>"#,
        )
        .unwrap();
        let absent = XmlResponse::parse(
            "pano1",
            r#"<response status="success" code="7"><result/></response>"#,
        )
        .unwrap();
        assert!(present.exists("result/entry"));
        assert!(!absent.exists("result/entry"));
    }

    #[test]
    fn test_texts_returns_lines_in_order() {
        let resp = XmlResponse::parse(
            "pano1",
            r#"<response status="success"><result><job><details>
                <line>Configuration committed successfully</line>
                <line>Device group pushed</line>
            </details></job></result></response>"#,
        )
        .unwrap();
        assert_eq!(
            resp.texts("result/job/details/line"),
            vec![
                "Configuration committed successfully".to_string(),
                "Device group pushed".to_string()
            ]
        );
    }

    #[test]
    fn test_msg_with_lines_joined() {
        let resp = XmlResponse::parse(
            "pano1",
            r#"<response status="error" code="12"><msg><line><![CDATA[ devices -> SN001 is invalid]]></line><line>second</line></msg></response>"#,
        )
        .unwrap();
        assert_eq!(
            resp.message().as_deref(),
            Some("devices -> SN001 is invalid\nsecond")
        );
    }

    #[test]
    fn test_into_checked_maps_error_status() {
        let resp = XmlResponse::parse(
            "pano1",
            r#"<response status="error" code="403"><result><msg>Invalid credentials.</msg></result></response>"#,
        )
        .unwrap();
        match resp.into_checked().unwrap_err() {
            XapiError::Api { host, code, message } => {
                assert_eq!(host, "pano1");
                assert_eq!(code.as_deref(), Some("403"));
                assert_eq!(message, "Invalid credentials.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_into_checked_passes_success() {
        let resp = XmlResponse::parse("pano1", HA_ACTIVE).unwrap();
        assert!(resp.into_checked().is_ok());
    }

    #[test]
    fn test_op_command_xml_nests_words() {
        assert_eq!(
            op_command_xml("show system info"),
            "<show><system><info></info></system></show>"
        );
    }

    #[test]
    fn test_op_command_xml_quoted_value() {
        assert_eq!(
            op_command_xml(r#"show jobs id "4""#),
            "<show><jobs><id>4</id></jobs></show>"
        );
    }

    #[test]
    fn test_op_command_xml_passthrough() {
        let cmd = "<show><high-availability><state></state></high-availability></show>";
        assert_eq!(op_command_xml(cmd), cmd);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"a&b<c>"d"'e'"#),
            "a&amp;b&lt;c&gt;&quot;d&quot;&apos;e&apos;"
        );
    }
}
