//! Operator prompts for interactive mode

use anyhow::anyhow;
use chrono::{Local, NaiveDate};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use movimentacoes::api::ExportPeriod;
use movimentacoes::error::Result;

pub struct Prompter {
    editor: DefaultEditor,
}

/// What the operator typed, or that they left (Ctrl-C / Ctrl-D)
pub enum Answer {
    Line(String),
    Quit,
}

impl Prompter {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| anyhow!("Failed to start prompt: {}", e))?;
        Ok(Self { editor })
    }

    pub fn ask(&mut self, prompt: &str) -> Result<Answer> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Answer::Line(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(Answer::Quit),
            Err(e) => Err(anyhow!("Prompt failed: {}", e)),
        }
    }

    /// Ask for the export period bounds, as typed. `None` when the operator
    /// quits; a mistyped date only surfaces in [`PeriodAnswer::resolve`].
    pub fn ask_period(&mut self) -> Result<Option<PeriodAnswer>> {
        let default = ExportPeriod::previous_month(Local::now().date_naive());

        let Answer::Line(start) = self.ask(&format!("Start date [{}]: ", default.start_date))?
        else {
            return Ok(None);
        };
        let Answer::Line(end) = self.ask(&format!("End date [{}]: ", default.end_date))? else {
            return Ok(None);
        };

        Ok(Some(PeriodAnswer { start, end }))
    }

    /// "Process another client? (1 - Yes, 0 - No)"; anything but `1` stops.
    pub fn ask_continue(&mut self) -> Result<bool> {
        Ok(matches!(
            self.ask("Process another client? (1 - Yes, 0 - No): ")?,
            Answer::Line(l) if is_yes(&l)
        ))
    }
}

/// Period bounds typed by the operator; empty means last month's bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodAnswer {
    pub start: String,
    pub end: String,
}

impl PeriodAnswer {
    pub fn resolve(&self, today: NaiveDate) -> Result<ExportPeriod> {
        ExportPeriod::from_inputs(Some(self.start.as_str()), Some(self.end.as_str()), today)
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim() == "1"
}
