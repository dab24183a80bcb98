//! Review surface: lets an operator tag and amend a memo before it is written
//!
//! The driver only sees the `Reviewer` trait. `TerminalReviewer` is a
//! line-oriented implementation over any reader/writer pair.

use std::io::{BufRead, Result, Write};

use crate::store::Note;
use crate::taxonomy::{Taxonomy, TaxonomyHandle};

/// What the operator decided for one memo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Write the memo with this content
    Proceed { content: String },
    /// Do not write, do not advance the checkpoint
    Cancel,
}

pub trait Reviewer {
    fn review(&mut self, note: &Note, taxonomy: &TaxonomyHandle) -> Result<ReviewOutcome>;
}

/// Non-interactive runs: content passes through unchanged
pub struct PassThrough;

impl Reviewer for PassThrough {
    fn review(&mut self, note: &Note, _taxonomy: &TaxonomyHandle) -> Result<ReviewOutcome> {
        Ok(ReviewOutcome::Proceed {
            content: note.content.clone(),
        })
    }
}

/// Tags line first, then the memo content
pub fn apply_tags(tags: &str, content: &str) -> String {
    let tags = tags.trim_end();
    if tags.is_empty() {
        content.to_string()
    } else {
        format!("{}\n{}", tags, content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Editing { tags: String, content: String },
    Committed { tags: String, content: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEvent {
    AddTag(String),
    Append(String),
    Clear,
    Save,
    Edit,
}

impl ReviewState {
    pub fn new(content: &str) -> Self {
        ReviewState::Editing {
            tags: String::new(),
            content: content.to_string(),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, ReviewState::Committed { .. })
    }

    pub fn tags(&self) -> &str {
        match self {
            ReviewState::Editing { tags, .. } | ReviewState::Committed { tags, .. } => tags,
        }
    }

    /// Final content: tags prepended as a line
    pub fn content(&self) -> String {
        match self {
            ReviewState::Editing { tags, content } | ReviewState::Committed { tags, content } => {
                apply_tags(tags, content)
            }
        }
    }

    /// Apply one event. Edits are only accepted while editing; `Err`
    /// carries the rejection message and leaves the state unchanged.
    pub fn transition(self, event: ReviewEvent) -> std::result::Result<Self, (Self, String)> {
        match (self, event) {
            (ReviewState::Editing { mut tags, content }, ReviewEvent::AddTag(tag)) => {
                tags.push_str(&tag);
                Ok(ReviewState::Editing { tags, content })
            }
            (ReviewState::Editing { tags, mut content }, ReviewEvent::Append(text)) => {
                if !content.is_empty() && !content.ends_with('\n') {
                    content.push('\n');
                }
                content.push_str(&text);
                Ok(ReviewState::Editing { tags, content })
            }
            (ReviewState::Editing { content, .. }, ReviewEvent::Clear) => {
                Ok(ReviewState::Editing {
                    tags: String::new(),
                    content,
                })
            }
            (ReviewState::Editing { tags, content }, ReviewEvent::Save) => {
                Ok(ReviewState::Committed { tags, content })
            }
            (ReviewState::Committed { tags, content }, ReviewEvent::Edit) => {
                Ok(ReviewState::Editing { tags, content })
            }
            (state @ ReviewState::Committed { .. }, event) => {
                Err((state, format!("{:?} needs edit mode, type 'edit' first", event)))
            }
            (state @ ReviewState::Editing { .. }, ReviewEvent::Edit) => {
                Err((state, "already editing".to_string()))
            }
        }
    }
}

/// Operator commands read from the terminal
enum Command {
    Event(ReviewEvent),
    Reload,
    Accept,
    Quit,
    Help,
    Unknown(String),
}

fn parse_command(line: &str, taxonomy: &Taxonomy) -> Command {
    let line = line.trim();
    match line {
        "save" => Command::Event(ReviewEvent::Save),
        "edit" => Command::Event(ReviewEvent::Edit),
        "clear" => Command::Event(ReviewEvent::Clear),
        "reload" => Command::Reload,
        "ok" => Command::Accept,
        "quit" | "q" => Command::Quit,
        "help" | "?" | "" => Command::Help,
        _ => {
            if let Some(text) = line.strip_prefix("append ") {
                return Command::Event(ReviewEvent::Append(text.to_string()));
            }
            match taxonomy.lookup(line) {
                Some(tag) => Command::Event(ReviewEvent::AddTag(tag.to_string())),
                None => Command::Unknown(line.to_string()),
            }
        }
    }
}

const HELP: &str = "commands: <tag path> | append <text> | clear | save | edit | reload | ok | quit";

pub struct TerminalReviewer<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalReviewer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn print_tags(&mut self, taxonomy: &Taxonomy) -> Result<()> {
        if taxonomy.is_empty() {
            writeln!(self.output, "  (no tags configured)")?;
        }
        for (path, tag) in taxonomy.entries() {
            writeln!(self.output, "  {:<24} {}", path, tag.trim_end())?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Reviewer for TerminalReviewer<R, W> {
    fn review(&mut self, note: &Note, taxonomy: &TaxonomyHandle) -> Result<ReviewOutcome> {
        let mut snapshot = taxonomy.snapshot();
        let mut state = ReviewState::new(&note.content);

        writeln!(self.output, "\n{}", "=".repeat(80))?;
        writeln!(self.output, "Memo {} (created {})", note.id, note.created_ts)?;
        writeln!(self.output, "{}", "=".repeat(80))?;
        writeln!(self.output, "{}", note.content)?;
        writeln!(self.output, "{}", "-".repeat(80))?;
        self.print_tags(&snapshot)?;
        writeln!(self.output, "{}", HELP)?;

        loop {
            let mode = if state.is_committed() { "saved" } else { "edit" };
            write!(self.output, "[{}] tags: {} > ", mode, state.tags().trim_end())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                // End of input behaves like quit
                return Ok(ReviewOutcome::Cancel);
            }

            match parse_command(&line, &snapshot) {
                Command::Event(event) => {
                    state = match state.transition(event) {
                        Ok(next) => next,
                        Err((unchanged, message)) => {
                            writeln!(self.output, "  {}", message)?;
                            unchanged
                        }
                    };
                }
                Command::Reload => match taxonomy.reload() {
                    Ok(fresh) => {
                        snapshot = fresh;
                        self.print_tags(&snapshot)?;
                    }
                    Err(e) => writeln!(self.output, "  reload failed: {}", e)?,
                },
                Command::Accept if state.is_committed() => {
                    return Ok(ReviewOutcome::Proceed {
                        content: state.content(),
                    });
                }
                Command::Accept => writeln!(self.output, "  save the tags before accepting")?,
                Command::Quit => return Ok(ReviewOutcome::Cancel),
                Command::Help => writeln!(self.output, "{}", HELP)?,
                Command::Unknown(text) => writeln!(self.output, "  unknown tag or command: {}", text)?,
            }
        }
    }
}
