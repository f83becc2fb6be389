//! Interactive line loop over stdin.
//!
//! Plain lines are sent as messages; lines starting with `/` are commands.
//! Free-text replies are printed as they stream in.

use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use mentor_chat::{ConversationEngine, DispatchOutcome, IgnoreReason, STARTER_PROMPTS};
use mentor_core::types::{
    ExplainMode, HistoryRecord, Language, ModuleType, PlainReply, SessionId, StructuredPayload,
    Turn,
};

const HELP: &str = "\
Type a question and press Enter to send it. Commands:
  /concept [topic]     explain a topic in 2 minutes (latest question if omitted)
  /mode <core|exam|friend|wrong>
  /weakness            analyze weak areas in this conversation
  /deep                deep dive; later messages stay in deep-dive mode
  /new                 start a new chat
  /reset               clear this chat (can be undone)
  /undo  /dismiss      restore or forget the last reset
  /lang <English|Hinglish|Gujarati>
  /act <n>             send suggested action n
  /history [module]    list saved sessions
  /open <session>      reopen a saved session
  /delete <session>... delete saved sessions
  /clear <module|all>  delete every session of a module, or all
  /voice <text>        handle text as a voice transcript
  /quit";

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    Module(ModuleType),
    All,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Empty line: send whatever is in the input buffer.
    Submit,
    Send(String),
    Concept(Option<String>),
    Mode(ExplainMode),
    Weakness,
    DeepDive,
    New,
    Reset,
    Undo,
    Dismiss,
    Language(Language),
    Action(usize),
    History(Option<ModuleType>),
    Open(SessionId),
    Delete(Vec<SessionId>),
    Clear(ClearTarget),
    Voice(String),
    Help,
    Quit,
}

fn module_usage() -> String {
    let names: Vec<&str> = ModuleType::ALL.iter().map(ModuleType::as_str).collect();
    format!("unknown module; expected one of: {}", names.join(", "))
}

/// Parse one input line. Errors carry a usage message.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Submit);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name.to_lowercase().as_str() {
        "concept" => Ok(Command::Concept(
            (!arg.is_empty()).then(|| arg.to_string()),
        )),
        "mode" => arg
            .parse::<ExplainMode>()
            .map(Command::Mode)
            .map_err(|_| "usage: /mode <core|exam|friend|wrong>".to_string()),
        "weakness" => Ok(Command::Weakness),
        "deep" => Ok(Command::DeepDive),
        "new" => Ok(Command::New),
        "reset" => Ok(Command::Reset),
        "undo" => Ok(Command::Undo),
        "dismiss" => Ok(Command::Dismiss),
        "lang" => arg
            .parse::<Language>()
            .map(Command::Language)
            .map_err(|_| "usage: /lang <English|Hinglish|Gujarati>".to_string()),
        "act" => arg
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Command::Action)
            .ok_or_else(|| "usage: /act <n>".to_string()),
        "history" if arg.is_empty() => Ok(Command::History(None)),
        "history" => arg
            .parse::<ModuleType>()
            .map(|m| Command::History(Some(m)))
            .map_err(|_| module_usage()),
        "open" if arg.is_empty() => Err("usage: /open <session>".to_string()),
        "open" => Ok(Command::Open(SessionId::from(arg))),
        "delete" => {
            let ids: Vec<SessionId> = arg.split_whitespace().map(SessionId::from).collect();
            if ids.is_empty() {
                Err("usage: /delete <session>...".to_string())
            } else {
                Ok(Command::Delete(ids))
            }
        }
        "clear" => match arg {
            "" => Err("usage: /clear <module|all>".to_string()),
            "all" => Ok(Command::Clear(ClearTarget::All)),
            module => module
                .parse::<ModuleType>()
                .map(|m| Command::Clear(ClearTarget::Module(m)))
                .map_err(|_| module_usage()),
        },
        "voice" if arg.is_empty() => Err("usage: /voice <text>".to_string()),
        "voice" => Ok(Command::Voice(arg.to_string())),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command /{}; try /help", other)),
    }
}

// =============================================================================
// Rendering
// =============================================================================

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("  {}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_actions(reply: &PlainReply) -> String {
    match reply.suggested_actions.as_deref() {
        Some(actions) if !actions.is_empty() => {
            let lines: Vec<String> = actions
                .iter()
                .enumerate()
                .map(|(i, action)| format!("  [{}] {}", i + 1, action))
                .collect();
            format!("Suggested (/act n):\n{}", lines.join("\n"))
        }
        _ => String::new(),
    }
}

/// Text for an assistant turn.
pub fn render_turn(turn: &Turn) -> String {
    match &turn.structured {
        None => turn.content.clone(),
        Some(StructuredPayload::Plain(reply)) => {
            let mut out = turn.content.clone();
            if let Some(confidence) = reply.confidence {
                out.push_str(&format!("\n\nConfidence: {}", confidence));
            }
            if let Some(question) = &reply.follow_up {
                out.push_str(&format!("\nYour turn: {}", question));
            }
            let actions = render_actions(reply);
            if !actions.is_empty() {
                out.push('\n');
                out.push_str(&actions);
            }
            out
        }
        Some(StructuredPayload::Concept(card)) => format!(
            "== {} ==\nConcept: {}\nExample: {}\nTakeaway: {}",
            card.topic.as_deref().unwrap_or("Concept"),
            card.concept,
            card.example,
            card.takeaway
        ),
        Some(StructuredPayload::Weakness(report)) => format!(
            "Weak areas:\n{}\nWhy: {}\nNext actions:\n{}\nConfidence: {}",
            bullets(&report.weak_areas),
            report.why_weak,
            bullets(&report.next_actions),
            report.confidence
        ),
        Some(StructuredPayload::DeepDive(dive)) => format!(
            "Overview: {}\nWhy it matters: {}\nStep by step:\n{}\nExample: {}\n\
             Common mistakes:\n{}\nMemory trick: {}\nTakeaway: {}",
            dive.overview,
            dive.why_it_matters,
            numbered(&dive.step_by_step),
            dive.example,
            bullets(&dive.common_mistakes),
            dive.memory_trick,
            dive.takeaway
        ),
    }
}

/// Prints the assistant turns appended after `start`, echoing a free-text
/// reply incrementally while it grows.
pub struct TurnPrinter {
    start: usize,
    /// Text already echoed, per turn index.
    printed: HashMap<usize, String>,
}

impl TurnPrinter {
    pub fn new(start: usize) -> Self {
        Self {
            start,
            printed: HashMap::new(),
        }
    }

    /// Echo new text of the latest turn if it is a growing free-text reply.
    pub fn stream(&mut self, turns: &[Turn], out: &mut dyn Write) -> io::Result<()> {
        let Some(index) = turns.len().checked_sub(1) else {
            return Ok(());
        };
        let turn = &turns[index];
        if index < self.start || turn.is_user() || turn.structured.is_some() {
            return Ok(());
        }

        let printed = self.printed.entry(index).or_default();
        if let Some(rest) = turn.content.strip_prefix(printed.as_str()) {
            if !rest.is_empty() {
                write!(out, "{}", rest)?;
                out.flush()?;
                printed.push_str(rest);
            }
        }
        Ok(())
    }

    /// Print whatever the exchange appended that was not echoed yet.
    pub fn finish(&mut self, turns: &[Turn], out: &mut dyn Write) -> io::Result<()> {
        for (index, turn) in turns.iter().enumerate().skip(self.start) {
            if turn.is_user() {
                continue;
            }
            match self.printed.get(&index) {
                Some(printed) => match turn.content.strip_prefix(printed.as_str()) {
                    Some(rest) => {
                        writeln!(out, "{}", rest)?;
                        let extras = render_turn(&Turn {
                            content: String::new(),
                            ..turn.clone()
                        });
                        let extras = extras.trim_start();
                        if !extras.is_empty() {
                            writeln!(out, "{}", extras)?;
                        }
                    }
                    // A parsed reply drops its section lines, so it may no
                    // longer extend what was echoed.
                    None => {
                        writeln!(out)?;
                        if let Some(StructuredPayload::Plain(reply)) = &turn.structured {
                            let actions = render_actions(reply);
                            if !actions.is_empty() {
                                writeln!(out, "{}", actions)?;
                            }
                        }
                    }
                },
                None => writeln!(out, "{}", render_turn(turn))?,
            }
        }
        out.flush()
    }
}

// =============================================================================
// Loop
// =============================================================================

struct Repl {
    engine: ConversationEngine,
}

impl Repl {
    fn greet(&self) {
        println!("Study mentor. Type a question, or /help for commands.");
        let turns = self.engine.turns();
        if turns.is_empty() {
            println!("Try one of these:");
            for prompt in STARTER_PROMPTS {
                println!("  - {}", prompt);
            }
        } else {
            self.print_conversation(&turns);
        }
        let input = self.engine.input();
        if !input.is_empty() {
            println!("Unsent draft: {}  (press Enter to send)", input);
        }
    }

    fn print_conversation(&self, turns: &[Turn]) {
        for turn in turns {
            if turn.is_user() {
                println!("> {}", turn.content);
            } else {
                println!("{}", render_turn(turn));
            }
        }
    }

    /// Run one engine call, echoing turns as they change.
    async fn echo<F, T>(&self, call: F) -> io::Result<T>
    where
        F: Future<Output = T>,
    {
        let mut rx = self.engine.subscribe();
        rx.borrow_and_update();
        let mut printer = TurnPrinter::new(self.engine.turns().len());
        let mut stdout = io::stdout();

        tokio::pin!(call);
        let result = loop {
            tokio::select! {
                result = &mut call => break result,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break (&mut call).await;
                    }
                    let turns = rx.borrow_and_update().clone();
                    printer.stream(&turns, &mut stdout)?;
                }
            }
        };

        printer.finish(&self.engine.turns(), &mut stdout)?;
        Ok(result)
    }

    fn report(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Ignored(IgnoreReason::Busy) => {
                println!("Still working on the last request.")
            }
            DispatchOutcome::Ignored(IgnoreReason::NoHistory) => {
                println!("Ask something first, then try again.")
            }
            other => debug!(outcome = ?other, "Command finished"),
        }
    }

    async fn execute(&self, command: Command) -> io::Result<()> {
        match command {
            Command::Submit => {
                if !self.engine.input().trim().is_empty() {
                    let outcome = self.echo(self.engine.send(None)).await?;
                    self.report(&outcome);
                }
            }
            Command::Send(text) => {
                self.engine.set_input(text);
                let outcome = self.echo(self.engine.send(None)).await?;
                self.report(&outcome);
            }
            Command::Concept(topic) => {
                if let Some(topic) = topic {
                    self.engine.set_input(topic);
                }
                let outcome = self.echo(self.engine.explain_concept()).await?;
                self.report(&outcome);
            }
            Command::Mode(mode) => {
                self.engine.set_explain_mode(mode);
                println!("Explain mode: {}", mode);
            }
            Command::Weakness => {
                let outcome = self.echo(self.engine.analyze_weakness()).await?;
                self.report(&outcome);
            }
            Command::DeepDive => {
                let outcome = self.echo(self.engine.enter_deep_dive()).await?;
                self.report(&outcome);
            }
            Command::New => {
                let id = self.engine.new_chat();
                println!("New chat ({})", id);
            }
            Command::Reset => {
                self.engine.reset();
                println!("Chat cleared. /undo to restore it.");
            }
            Command::Undo => {
                if self.engine.undo() {
                    println!("Chat restored.");
                    self.print_conversation(&self.engine.turns());
                } else {
                    println!("Nothing to undo.");
                }
            }
            Command::Dismiss => {
                self.engine.dismiss_undo();
            }
            Command::Language(language) => {
                self.engine.set_language(language);
                println!("Language: {}", language);
            }
            Command::Action(n) => match self.engine.suggested_actions().get(n - 1).cloned() {
                Some(action) => {
                    println!("> {}", action);
                    let outcome = self.echo(self.engine.send(Some(&action))).await?;
                    self.report(&outcome);
                }
                None => println!("No suggested action {}.", n),
            },
            Command::History(module) => match self.engine.history().list(module) {
                Ok(records) => print_history(&records),
                Err(e) => println!("Could not load history: {}", e),
            },
            Command::Open(id) => match self.engine.open_session(id) {
                Ok(_) => self.print_conversation(&self.engine.turns()),
                Err(e) => println!("{}", e.user_message()),
            },
            Command::Delete(ids) => {
                let summary = self.engine.history().delete_many(&ids);
                println!("Deleted {} of {}.", summary.deleted, summary.requested);
                for id in &summary.failed {
                    println!("  failed: {}", id);
                }
            }
            Command::Clear(target) => {
                let result = match target {
                    ClearTarget::All => self.engine.history().delete_everything(),
                    ClearTarget::Module(module) => self.engine.history().clear_module(module),
                };
                match result {
                    Ok(n) => println!("Deleted {} sessions.", n),
                    Err(e) => println!("Could not delete history: {}", e),
                }
            }
            Command::Voice(transcript) => {
                match self
                    .echo(self.engine.handle_voice_transcript(&transcript))
                    .await?
                {
                    Some(outcome) => self.report(&outcome),
                    None => println!("Transcript placed in the input. Press Enter to send."),
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }
}

fn print_history(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("No saved sessions.");
        return;
    }
    for record in records {
        let updated = record
            .updated_at
            .to_datetime()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M");
        println!(
            "{}  {}  [{}]  {}",
            record.session_id,
            updated,
            record.module,
            record.title.as_deref().unwrap_or("(untitled)")
        );
    }
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

/// Read lines from stdin until `/quit` or end of input.
pub async fn run(engine: ConversationEngine) -> io::Result<()> {
    let repl = Repl { engine };
    repl.greet();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => repl.execute(command).await?,
            Err(usage) => println!("{}", usage),
        }
    }
    Ok(())
}
