use mathgate_core::{ImageMeta, Pod, PodResult, PodState, Subpod};
use roxmltree::{Document, Node};
use serde_json::Value;
use tracing::warn;

const UNKNOWN_XML_ERROR: &str = "Unknown error in XML response";

/// Outcome of an evaluation answered in XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalXml {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Reads a `<queryresult>` document into pods. Malformed XML yields an
/// unsuccessful result carrying the parse error.
pub fn parse_query_result(xml: &str, original_query: &str) -> PodResult {
    let mut result = PodResult {
        original_query: original_query.to_string(),
        assumptions: Value::Array(Vec::new()),
        warnings: Value::Array(Vec::new()),
        ..PodResult::default()
    };

    let document = match Document::parse(xml) {
        Ok(document) => document,
        Err(error) => {
            warn!(error = %error, "failed to parse query result xml");
            result.error = Some(format!("XML parse error: {error}"));
            return result;
        }
    };

    let root = document.root_element();
    result.success = root.attribute("success") == Some("true");
    if root.attribute("error") == Some("true") {
        result.error = Some(error_message(root));
    }

    result.pods = root
        .descendants()
        .filter(|node| node.has_tag_name("pod"))
        .map(pod_from_node)
        .collect();

    result
}

pub fn parse_eval_response(xml: &str, image_output: bool) -> EvalXml {
    let document = match Document::parse(xml) {
        Ok(document) => document,
        Err(error) => {
            warn!(error = %error, "failed to parse evaluation xml");
            return EvalXml {
                success: false,
                output: None,
                error: Some(format!("Failed to parse XML response: {error}")),
            };
        }
    };

    let root = document.root_element();
    if !is_successful(root) {
        return EvalXml {
            success: false,
            output: None,
            error: Some(error_message(root)),
        };
    }

    let output = if image_output {
        first_image_src(root).unwrap_or_else(|| first_plaintext(root))
    } else {
        first_plaintext(root)
    };

    EvalXml {
        success: true,
        output: Some(output),
        error: None,
    }
}

fn is_successful(root: Node) -> bool {
    if root.attribute("success") == Some("true") {
        return true;
    }
    root.descendants()
        .find(|node| node.has_tag_name("success"))
        .and_then(|node| node.text())
        .map(|text| text.trim() == "true")
        .unwrap_or(false)
}

fn error_message(root: Node) -> String {
    root.descendants()
        .filter(|node| node.has_tag_name("error"))
        .flat_map(|node| node.children())
        .find(|node| node.has_tag_name("msg"))
        .and_then(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| UNKNOWN_XML_ERROR.to_string())
}

fn first_image_src(root: Node) -> Option<String> {
    root.descendants()
        .find(|node| node.has_tag_name("img"))
        .and_then(|node| node.attribute("src"))
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}

fn first_plaintext(root: Node) -> String {
    root.descendants()
        .find(|node| node.has_tag_name("plaintext"))
        .and_then(|node| node.text())
        .unwrap_or_default()
        .to_string()
}

fn pod_from_node(node: Node) -> Pod {
    Pod {
        id: node.attribute("id").unwrap_or_default().to_string(),
        title: node.attribute("title").unwrap_or_default().to_string(),
        position: node.attribute("position").and_then(|value| value.parse().ok()),
        subpods: node
            .descendants()
            .filter(|child| child.has_tag_name("subpod"))
            .map(subpod_from_node)
            .collect(),
        states: node
            .descendants()
            .filter(|child| child.has_tag_name("state"))
            .map(|state| PodState {
                name: state.attribute("name").unwrap_or_default().to_string(),
                input: state.attribute("input").map(str::to_string),
                stepbystep: state.attribute("stepbystep") == Some("true"),
            })
            .collect(),
    }
}

fn subpod_from_node(node: Node) -> Subpod {
    let plaintext = node
        .descendants()
        .find(|child| child.has_tag_name("plaintext"))
        .and_then(|child| child.text())
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let img = node
        .descendants()
        .find(|child| child.has_tag_name("img"))
        .map(|img| ImageMeta {
            src: img.attribute("src").unwrap_or_default().to_string(),
            alt: img.attribute("alt").map(str::to_string),
            width: img.attribute("width").and_then(|value| value.parse().ok()),
            height: img.attribute("height").and_then(|value| value.parse().ok()),
        });

    Subpod {
        title: node.attribute("title").map(str::to_string),
        plaintext,
        img,
    }
}
