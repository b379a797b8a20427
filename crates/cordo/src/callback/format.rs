//! Callback message formatting.
//!
//! Results are wrapped in tagged delimiters so the parent agent can tell a
//! coordinator callback apart from user input.

use super::processor::ChildResult;

/// Message for a single completed child.
pub fn single_child_message(child: &ChildResult) -> String {
    if child.succeeded {
        format!(
            "<agent-callback session=\"{}\" status=\"completed\">\n## Child Result\n\n{}\n</agent-callback>\n\nPlease continue with the orchestration based on this result.",
            child.session_id,
            child.result_body()
        )
    } else {
        format!(
            "<agent-callback session=\"{}\" status=\"failed\">\n## Error\n\n{}\n</agent-callback>\n\nPlease continue with the orchestration based on this result.",
            child.session_id,
            child.error_body()
        )
    }
}

/// Message aggregating several completed children into one resume.
pub fn aggregated_message(children: &[ChildResult]) -> String {
    let blocks: Vec<String> = children
        .iter()
        .map(|child| {
            if child.succeeded {
                format!(
                    "<child-result session=\"{}\" status=\"completed\">\n{}\n</child-result>",
                    child.session_id,
                    child.result_body()
                )
            } else {
                format!(
                    "<child-result session=\"{}\" status=\"failed\">\n{}\n</child-result>",
                    child.session_id,
                    child.error_body()
                )
            }
        })
        .collect();

    format!(
        "<agent-callback type=\"aggregated\" count=\"{}\">\n{}\n</agent-callback>\n\nPlease continue with the orchestration based on these results.",
        children.len(),
        blocks.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(session_id: &str, result: &str) -> ChildResult {
        ChildResult {
            session_id: session_id.to_string(),
            succeeded: true,
            result_text: Some(result.to_string()),
            result_data: None,
            error_message: None,
        }
    }

    #[test]
    fn single_success_has_the_documented_shell() {
        let message = single_child_message(&success("ses_child0001", "42"));

        assert!(message.starts_with("<agent-callback session=\"ses_child0001\" status=\"completed\">"));
        assert!(message.contains("## Child Result\n\n42\n"));
        assert!(message.ends_with(
            "</agent-callback>\n\nPlease continue with the orchestration based on this result."
        ));
    }

    #[test]
    fn single_failure_uses_error_section() {
        let child = ChildResult {
            session_id: "ses_child0001".into(),
            succeeded: false,
            result_text: None,
            result_data: None,
            error_message: Some("boom".into()),
        };
        let message = single_child_message(&child);

        assert!(message.contains("status=\"failed\""));
        assert!(message.contains("## Error\n\nboom"));
    }

    #[test]
    fn structured_results_are_rendered_as_json() {
        let child = ChildResult {
            session_id: "ses_child0001".into(),
            succeeded: true,
            result_text: None,
            result_data: Some(json!({"answer": 42})),
            error_message: None,
        };
        let message = single_child_message(&child);
        assert!(message.contains("{\"answer\":42}"));
    }

    #[test]
    fn aggregated_wraps_all_children() {
        let children = vec![
            success("ses_c1", "one"),
            success("ses_c2", "two"),
            success("ses_c3", "three"),
        ];
        let message = aggregated_message(&children);

        assert!(message.starts_with("<agent-callback type=\"aggregated\" count=\"3\">"));
        assert!(message.contains("<child-result session=\"ses_c1\" status=\"completed\">"));
        assert!(message.contains("three"));
        assert!(message.ends_with(
            "</agent-callback>\n\nPlease continue with the orchestration based on these results."
        ));
    }
}
