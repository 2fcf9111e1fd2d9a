//! Default commit message markup.
//!
//! `[target]` references a card, `[target](list name)` references a card and
//! asks for it to be moved to the named list. Everything else is text.

use super::{MessageNode, MessageParser, ParseError};

/// Parser for the bracket markup described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketParser;

impl MessageParser for BracketParser {
    fn parse(&self, message: &str) -> Result<Vec<MessageNode>, ParseError> {
        let mut nodes = Vec::new();
        let mut cursor = 0;

        while let Some(found) = message[cursor..].find('[') {
            let open = cursor + found;
            if open > cursor {
                nodes.push(MessageNode::text(&message[cursor..open]));
            }

            let close = message[open + 1..]
                .find(']')
                .map(|i| open + 1 + i)
                .ok_or_else(|| ParseError::new(open, "unterminated card reference"))?;

            let target = &message[open + 1..close];
            if target.contains('[') || target.contains('\n') {
                return Err(ParseError::new(open, "unterminated card reference"));
            }
            let target = target.trim();
            if target.is_empty() {
                return Err(ParseError::new(open, "empty card reference"));
            }

            let mut end = close + 1;
            let mut children = Vec::new();
            if message[end..].starts_with('(') {
                let paren = end;
                let paren_close = message[paren + 1..]
                    .find(')')
                    .map(|i| paren + 1 + i)
                    .ok_or_else(|| ParseError::new(paren, "unterminated list name"))?;

                let list_name = message[paren + 1..paren_close].trim();
                if !list_name.is_empty() {
                    children.push(MessageNode::text(list_name));
                }
                end = paren_close + 1;
            }

            nodes.push(MessageNode::link(target, children));
            cursor = end;
        }

        if cursor < message.len() {
            nodes.push(MessageNode::text(&message[cursor..]));
        }

        Ok(nodes)
    }
}
