//! The structural command table behind the block command menu.

use serde::{Deserialize, Serialize};

/// A structural transformation of the block at the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCommand {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletList,
    OrderedList,
    TaskList,
    CodeBlock,
    Blockquote,
    HorizontalRule,
}

/// A menu entry: the command plus what the user sees and searches by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: BlockCommand,
    pub label: &'static str,
    pub keywords: &'static [&'static str],
}

impl CommandSpec {
    /// Case-insensitive substring match on the label or any keyword.
    /// An empty query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let query = query.to_lowercase();
        self.label.to_lowercase().contains(&query)
            || self.keywords.iter().any(|k| k.to_lowercase().contains(&query))
    }
}

/// Every command, in menu order.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: BlockCommand::Paragraph,
        label: "Text",
        keywords: &["text", "paragraph", "plain", "p"],
    },
    CommandSpec {
        command: BlockCommand::Heading1,
        label: "Heading 1",
        keywords: &["h1", "title", "big"],
    },
    CommandSpec {
        command: BlockCommand::Heading2,
        label: "Heading 2",
        keywords: &["h2", "subtitle", "medium"],
    },
    CommandSpec {
        command: BlockCommand::Heading3,
        label: "Heading 3",
        keywords: &["h3", "subheading", "small"],
    },
    CommandSpec {
        command: BlockCommand::BulletList,
        label: "Bullet List",
        keywords: &["ul", "unordered", "bullet", "list"],
    },
    CommandSpec {
        command: BlockCommand::OrderedList,
        label: "Numbered List",
        keywords: &["ol", "ordered", "numbered", "list"],
    },
    CommandSpec {
        command: BlockCommand::TaskList,
        label: "Task List",
        keywords: &["todo", "checkbox", "task", "list"],
    },
    CommandSpec {
        command: BlockCommand::CodeBlock,
        label: "Code Block",
        keywords: &["code", "pre", "snippet"],
    },
    CommandSpec {
        command: BlockCommand::Blockquote,
        label: "Quote",
        keywords: &["blockquote", "quote", "citation"],
    },
    CommandSpec {
        command: BlockCommand::HorizontalRule,
        label: "Divider",
        keywords: &["hr", "rule", "separator", "divider"],
    },
];

impl BlockCommand {
    pub fn spec(self) -> &'static CommandSpec {
        // The table covers every variant.
        COMMANDS
            .iter()
            .find(|spec| spec.command == self)
            .unwrap_or(&COMMANDS[0])
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    /// Heading level this command produces, if any.
    pub fn heading_level(self) -> Option<u8> {
        match self {
            BlockCommand::Heading1 => Some(1),
            BlockCommand::Heading2 => Some(2),
            BlockCommand::Heading3 => Some(3),
            _ => None,
        }
    }
}

/// Commands matching `query`, in table order.
pub fn filter_commands(query: &str) -> Vec<&'static CommandSpec> {
    COMMANDS.iter().filter(|spec| spec.matches(query)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(query: &str) -> Vec<&'static str> {
        filter_commands(query).iter().map(|c| c.label).collect()
    }

    #[test]
    fn test_empty_query_lists_everything() {
        assert_eq!(filter_commands("").len(), COMMANDS.len());
        assert_eq!(labels("")[0], "Text");
        assert_eq!(labels("").last(), Some(&"Divider"));
    }

    #[test]
    fn test_head_matches_headings() {
        assert_eq!(labels("head"), vec!["Heading 1", "Heading 2", "Heading 3"]);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        assert_eq!(labels("LIST"), vec!["Bullet List", "Numbered List", "Task List"]);
        assert_eq!(labels("todo"), vec!["Task List"]);
        assert_eq!(labels("hr"), vec!["Divider"]);
    }

    #[test]
    fn test_no_match() {
        assert!(filter_commands("zzz").is_empty());
    }

    #[test]
    fn test_spec_lookup() {
        assert_eq!(BlockCommand::Blockquote.label(), "Quote");
        assert_eq!(BlockCommand::Heading2.heading_level(), Some(2));
    }
}
