//! `imint chat`: interactive analyst conversation.
//!
//! Plain lines are questions for the analyst; lines starting with `/` are
//! commands. Type `/help` for the list, Tab for completion.

use anyhow::Result;
use imint::{Conversation, TurnOutcome};
use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config as EditorConfig, Editor, Event, EventContext,
    EventHandler, Helper, KeyEvent, RepeatCount,
};

use crate::cli::ask_cmd::print_outcome;
use crate::cli::output::Styled;
use crate::cli::{open_fetcher, require_analyst};
use crate::config::{imint_dir, Config};

const COMMANDS: &[(&str, &str)] = &[
    ("/history", "Show recent questions and outcomes"),
    ("/reset", "Start a new conversation"),
    ("/refresh", "Drop cached warehouse results"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit"),
];

/// One line of input, interpreted.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Empty,
    Question(&'a str),
    Command(&'a str),
}

pub fn parse_line(line: &str) -> ChatInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    match line.strip_prefix('/') {
        Some(cmd) => ChatInput::Command(cmd.split_whitespace().next().unwrap_or("help")),
        None => ChatInput::Question(line),
    }
}

struct ChatHelper;

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];
        if !input.starts_with('/') || input.contains(' ') {
            return Ok((pos, Vec::new()));
        }
        let matches = COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(input))
            .map(|(cmd, desc)| Pair {
                display: format!("{cmd:<12} {desc}"),
                replacement: format!("{cmd} "),
            })
            .collect();
        Ok((0, matches))
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|(cmd, _)| cmd.starts_with(line) && *cmd != line)
            .map(|(cmd, _)| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ChatHelper {}
impl Validator for ChatHelper {}
impl Helper for ChatHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

pub async fn run(config: &Config) -> Result<()> {
    let proxy = require_analyst(config)?;
    let mut fetcher = open_fetcher(config)?;
    let mut conv = Conversation::new(config.history_window);
    let s = Styled::new();

    eprintln!();
    eprintln!(
        "  {} {} {}",
        s.ok_sym(),
        s.bold(&format!("imint chat v{}", env!("CARGO_PKG_VERSION"))),
        s.dim("ask the imagery warehouse in plain English")
    );
    eprintln!();
    eprintln!("    Type a question, /help for commands, /exit to quit.");
    eprintln!();

    let editor_config = EditorConfig::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();
    let mut rl: Editor<ChatHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(editor_config)?;
    rl.set_helper(Some(ChatHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = imint_dir().join("chat_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mimint>\x1b[0m ";
    loop {
        match rl.readline(prompt) {
            Ok(line) => match parse_line(&line) {
                ChatInput::Empty => continue,
                ChatInput::Command("exit" | "quit" | "q") => break,
                ChatInput::Command("help" | "h" | "?") => cmd_help(),
                ChatInput::Command("clear" | "cls") => eprint!("\x1b[2J\x1b[H"),
                ChatInput::Command("history") => cmd_history(&conv),
                ChatInput::Command("reset") => {
                    conv = Conversation::new(config.history_window);
                    eprintln!("  Started a new conversation.");
                }
                ChatInput::Command("refresh") => {
                    fetcher.clear_cache();
                    eprintln!("  Cached results dropped.");
                }
                ChatInput::Command(other) => {
                    eprintln!("  Unknown command '/{other}'. Type /help for commands.");
                }
                ChatInput::Question(q) => {
                    eprintln!();
                    match proxy.ask(&mut conv, q, &fetcher).await {
                        Ok(outcome) => print_outcome(&outcome),
                        Err(e) => eprintln!("  {} {e}", s.err_sym()),
                    }
                    // shown; ready for the next question
                    let _ = conv.acknowledge();
                    eprintln!();
                }
            },
            Err(ReadlineError::Interrupted) => {
                eprintln!("  (Ctrl+C) Type /exit to quit.");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(imint_dir());
    let _ = rl.save_history(&hist_path);
    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<12} {desc}");
    }
    eprintln!();
    eprintln!("  Anything else is sent to the analyst as a question.");
    eprintln!();
}

fn cmd_history(conv: &Conversation) {
    let turns = conv.recent_turns();
    if turns.is_empty() {
        eprintln!("  No questions yet.");
        return;
    }
    eprintln!();
    for turn in turns {
        let status = match &turn.outcome {
            TurnOutcome::Pending => "pending".to_string(),
            TurnOutcome::Answered { reply, .. } => match &reply.sql {
                Some(_) => "answered (sql)".to_string(),
                None => "answered".to_string(),
            },
            TurnOutcome::Failed { error } => format!("failed: {error}"),
        };
        eprintln!(
            "    {}  {}  [{status}]",
            turn.asked_at.format("%H:%M:%S"),
            turn.question
        );
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), ChatInput::Empty);
        assert_eq!(parse_line("/history"), ChatInput::Command("history"));
        assert_eq!(parse_line(" /exit now "), ChatInput::Command("exit"));
        assert_eq!(parse_line("/"), ChatInput::Command("help"));
        assert_eq!(
            parse_line("How many images in East Bay?"),
            ChatInput::Question("How many images in East Bay?")
        );
    }

    #[test]
    fn test_commands_are_slash_prefixed() {
        assert!(COMMANDS.iter().all(|(c, _)| c.starts_with('/')));
    }
}
