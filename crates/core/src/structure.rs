//! Turns a model's free-text list of paths into a file tree.
//!
//! Only lines containing `/` or `\` are read. A path that ends in `/`, or a
//! name that is later used as a parent, becomes a directory; everything else
//! at the end of a path is a file. Siblings keep first-seen order.

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    File { name: String },
    Directory { name: String, children: Vec<Node> },
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File { name } | Node::Directory { name, .. } => name,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }
}

/// Leading directories models like to wrap the whole layout in.
pub const DEFAULT_WRAPPER_DIRECTORIES: [&str; 3] = ["project", "root", "structure"];

#[derive(Debug, Clone)]
pub struct StructureParser {
    wrapper_prefix: Regex,
}

impl StructureParser {
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_wrappers(&DEFAULT_WRAPPER_DIRECTORIES)
    }

    /// `wrappers` are stripped once from the front of every path.
    pub fn with_wrappers(wrappers: &[&str]) -> Result<Self, regex::Error> {
        let alternatives = wrappers
            .iter()
            .map(|wrapper| regex::escape(wrapper))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            wrapper_prefix: Regex::new(&format!("^({alternatives})/"))?,
        })
    }

    pub fn parse(&self, response: &str) -> Vec<Node> {
        let mut roots = Vec::new();

        for line in response.lines() {
            let line = line.trim();
            if line.is_empty() || !(line.contains('/') || line.contains('\\')) {
                continue;
            }

            let normalized = line.replace('\\', "/");
            let path = self.wrapper_prefix.replace(&normalized, "");
            let ends_as_directory = path.ends_with('/');

            let components = path
                .split('/')
                .map(str::trim)
                .filter(|component| !component.is_empty())
                .collect::<Vec<_>>();

            insert_path(&mut roots, &components, ends_as_directory);
        }

        roots
    }
}

fn insert_path(level: &mut Vec<Node>, components: &[&str], leaf_is_directory: bool) {
    let Some((first, rest)) = components.split_first() else {
        return;
    };
    let wants_directory = !rest.is_empty() || leaf_is_directory;

    let position = match level.iter().position(|node| node.name() == *first) {
        Some(position) => position,
        None => {
            level.push(if wants_directory {
                Node::Directory {
                    name: first.to_string(),
                    children: Vec::new(),
                }
            } else {
                Node::File {
                    name: first.to_string(),
                }
            });
            level.len() - 1
        }
    };

    let node = &mut level[position];
    if wants_directory && !node.is_directory() {
        let name = node.name().to_string();
        *node = Node::Directory {
            name,
            children: Vec::new(),
        };
    }

    if let Node::Directory { children, .. } = node {
        insert_path(children, rest, leaf_is_directory);
    }
}
