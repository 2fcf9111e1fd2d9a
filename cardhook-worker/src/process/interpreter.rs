//! Commit message interpretation.
//!
//! A commit turns into one [`Action`] per card link in its message. All the
//! actions of a commit share one comment:
//!
//! ```text
//! <author name>\n<text nodes, truncated>\n<commit url>
//! ```
//!
//! The text part is cut so the whole comment fits `max_comment_size` bytes,
//! URL included. Link nodes, and anything nested inside them, contribute no
//! text.

use tracing::debug;

use super::push::Commit;
use crate::action::Action;
use crate::message::{MessageNode, MessageParser, ParseError};

/// Derive the actions requested by `commit`.
///
/// Deterministic for a given commit and parser, so redelivered batches
/// produce identical actions (and identical idempotence keys).
pub fn interpret_commit(
    parser: &dyn MessageParser,
    commit: &Commit,
    max_comment_size: usize,
) -> Result<Vec<Action>, ParseError> {
    let nodes = parser.parse(&commit.message)?;

    debug!(
        commit_id = %commit.id,
        node_count = nodes.len(),
        "commit_message_parsed"
    );

    let comment_body = build_comment(&commit.author.name, &nodes, &commit.url, max_comment_size);

    let mut links = Vec::new();
    collect_links(&nodes, &mut links);

    Ok(links
        .into_iter()
        .map(|(target, children)| Action {
            target_ref: target.to_string(),
            comment_body: comment_body.clone(),
            source_url: commit.url.clone(),
            move_to_name: children.first().map(|child| child.value().to_string()),
        })
        .collect())
}

/// Build the comment shared by every action of a commit.
pub fn build_comment(author: &str, nodes: &[MessageNode], url: &str, max_comment_size: usize) -> String {
    let mut body = String::with_capacity(max_comment_size);
    body.push_str(author);
    body.push('\n');

    for node in nodes {
        if let MessageNode::Text { value } = node {
            body.push_str(value);
        }
    }

    // +1 for the newline before the URL
    let max_body = max_comment_size.saturating_sub(url.len() + 1);
    truncate_at_char_boundary(&mut body, max_body);

    body.push('\n');
    body.push_str(url);
    body
}

/// Cut `text` to at most `max` bytes, backing off to the previous character
/// boundary when `max` falls inside a multi-byte character.
fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// Links in document order, each followed by the links nested inside it.
fn collect_links<'a>(nodes: &'a [MessageNode], out: &mut Vec<(&'a str, &'a [MessageNode])>) {
    for node in nodes {
        if let MessageNode::Link { value, children } = node {
            out.push((value.as_str(), children.as_slice()));
            collect_links(children, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BracketParser;
    use crate::process::push::Person;

    fn commit(message: &str, url: &str, author: &str) -> Commit {
        Commit {
            id: "c0ffee".to_string(),
            message: message.to_string(),
            url: url.to_string(),
            author: Person {
                name: author.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parser returning a fixed tree, for shapes the bracket markup cannot express.
    struct FixedParser(Vec<MessageNode>);

    impl MessageParser for FixedParser {
        fn parse(&self, _message: &str) -> Result<Vec<MessageNode>, ParseError> {
            Ok(self.0.clone())
        }
    }

    struct FailingParser;

    impl MessageParser for FailingParser {
        fn parse(&self, _message: &str) -> Result<Vec<MessageNode>, ParseError> {
            Err(ParseError::new(3, "unterminated card reference"))
        }
    }

    #[test]
    fn test_link_with_list_name() {
        let actions = interpret_commit(
            &BracketParser,
            &commit("Fixed it [CARD-1](Done)", "http://x/1", "Ann"),
            200,
        )
        .unwrap();

        assert_eq!(
            actions,
            vec![Action {
                target_ref: "CARD-1".to_string(),
                comment_body: "Ann\nFixed it \nhttp://x/1".to_string(),
                source_url: "http://x/1".to_string(),
                move_to_name: Some("Done".to_string()),
            }]
        );
    }

    #[test]
    fn test_link_without_children_has_no_move() {
        let actions =
            interpret_commit(&BracketParser, &commit("[CARD-2] cleanup", "http://x/2", "Bo"), 200)
                .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].move_to_name, None);
        assert_eq!(actions[0].comment_body, "Bo\n cleanup\nhttp://x/2");
    }

    #[test]
    fn test_no_links_no_actions() {
        let actions =
            interpret_commit(&BracketParser, &commit("just prose", "http://x/3", "Cy"), 200).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_links_share_comment_and_keep_order() {
        let actions = interpret_commit(
            &BracketParser,
            &commit("[A](Doing) and [B] done", "http://x/4", "Di"),
            200,
        )
        .unwrap();

        let targets: Vec<&str> = actions.iter().map(|a| a.target_ref.as_str()).collect();
        assert_eq!(targets, vec!["A", "B"]);
        assert_eq!(actions[0].comment_body, actions[1].comment_body);
        assert_eq!(actions[0].comment_body, "Di\n and  done\nhttp://x/4");
        assert_ne!(actions[0].idempotence_key(), actions[1].idempotence_key());
    }

    #[test]
    fn test_truncation_reserves_room_for_url() {
        let url = "http://example.com/1";
        assert_eq!(url.len(), 20);

        let long = "x".repeat(200);
        let actions =
            interpret_commit(&BracketParser, &commit(&format!("{long} [C]"), url, "Ann"), 50).unwrap();

        let comment = &actions[0].comment_body;
        assert_eq!(comment.len(), 50);

        let (text, tail) = comment.rsplit_once('\n').unwrap();
        assert_eq!(text.len(), 29);
        assert_eq!(tail, url);
        assert!(text.starts_with("Ann\nxxx"));
    }

    #[test]
    fn test_short_comment_is_not_padded() {
        let comment = build_comment("Ann", &[MessageNode::text("hi")], "http://x/1", 50);
        assert_eq!(comment, "Ann\nhi\nhttp://x/1");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // "Ann\n" is 4 bytes, each "é" is 2; a budget of 7 lands mid-character.
        let comment = build_comment("Ann", &[MessageNode::text("ééé")], "u", 9);
        assert_eq!(comment, "Ann\né\nu");
        assert!(comment.len() <= 9);
    }

    #[test]
    fn test_url_longer_than_limit_leaves_empty_body() {
        let comment = build_comment("Ann", &[MessageNode::text("hi")], "http://x/1", 5);
        assert_eq!(comment, "\nhttp://x/1");
    }

    #[test]
    fn test_nested_links_are_found_and_contribute_no_text() {
        let parser = FixedParser(vec![
            MessageNode::text("top "),
            MessageNode::link(
                "OUTER",
                vec![
                    MessageNode::text("Review"),
                    MessageNode::link("INNER", vec![]),
                ],
            ),
            MessageNode::text("tail"),
        ]);

        let actions = interpret_commit(&parser, &commit("ignored", "http://x/5", "Ed"), 200).unwrap();

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].target_ref, "OUTER");
        assert_eq!(actions[0].move_to_name.as_deref(), Some("Review"));
        assert_eq!(actions[1].target_ref, "INNER");
        assert_eq!(actions[1].move_to_name, None);
        assert_eq!(actions[0].comment_body, "Ed\ntop tail\nhttp://x/5");
    }

    #[test]
    fn test_parse_error_propagates() {
        let err = interpret_commit(&FailingParser, &commit("x", "http://x/6", "Fa"), 200).unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn test_interpretation_is_deterministic() {
        let c = commit("Fixed [A](Done) and [B]", "http://x/7", "Gi");
        let first = interpret_commit(&BracketParser, &c, 100).unwrap();
        let second = interpret_commit(&BracketParser, &c, 100).unwrap();
        assert_eq!(first, second);
    }
}
