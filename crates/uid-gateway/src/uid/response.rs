use super::UidApiError;
use roxmltree::{Document, Node};
use std::fmt;

/// Rejection reported for a single login or logout entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFailure {
    pub username: String,
    pub ip: String,
    pub message: String,
}

impl fmt::Display for MappingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} at {})", self.message, self.username, self.ip)
    }
}

/// Reported for logouts of users the firewall has already forgotten
const DELETE_MAPPING_FAILED: &str = "delete mapping failed";

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| n.has_tag_name(name))
}

fn api_failure(message: impl Into<String>, body: &str) -> UidApiError {
    UidApiError::ApiFailure {
        message: message.into(),
        body: body.to_string(),
    }
}

/// Interpret a User-ID API response body.
///
/// With `verbose` off, "delete mapping failed" entries are not reported.
pub fn parse_response(body: &str, verbose: bool) -> Result<(), UidApiError> {
    let doc = Document::parse(body)
        .map_err(|e| api_failure(format!("unsupported response: {}", e), body))?;
    let root = doc.root_element();

    if !root.has_tag_name("response") {
        return Err(api_failure("unknown result", body));
    }

    match root.attribute("status") {
        Some("success") => Ok(()),
        Some("error") => mapping_failures(root, body, verbose),
        Some(status) => Err(api_failure(format!("failed with status {}", status), body)),
        None => Err(api_failure("unknown result", body)),
    }
}

fn mapping_failures(root: Node, body: &str, verbose: bool) -> Result<(), UidApiError> {
    let entries: Vec<Node> = children(root, "msg")
        .flat_map(|n| children(n, "line"))
        .flat_map(|n| children(n, "uid-response"))
        .flat_map(|n| children(n, "payload"))
        .flat_map(|n| n.children().filter(|c| c.has_tag_name("login") || c.has_tag_name("logout")))
        .flat_map(|n| children(n, "entry"))
        .collect();

    if entries.is_empty() {
        return Err(api_failure("failed with status error", body));
    }

    let mut failures: Vec<MappingFailure> = entries
        .iter()
        .map(|entry| MappingFailure {
            username: entry.attribute("name").unwrap_or_default().to_string(),
            ip: entry.attribute("ip").unwrap_or_default().to_string(),
            message: entry.attribute("message").unwrap_or_default().to_string(),
        })
        .filter(|failure| {
            verbose
                || !failure
                    .message
                    .to_ascii_lowercase()
                    .contains(DELETE_MAPPING_FAILED)
        })
        .collect();

    match failures.len() {
        0 => Ok(()),
        1 => Err(UidApiError::MappingFailure(failures.remove(0))),
        count => Err(UidApiError::AggregateMappingFailure { failures, count }),
    }
}
