use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufRead, Write};

use funnel_engine::{StepView, Submission, render_json, render_text};
use funnel_spec::{AnswerShape, AnswerValue, QuestionSpec};

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: question prompts only.
    Clean,
    /// Verbose output: progress, question ids and parse expectations.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// How each step is drawn.
#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum RenderMode {
    Text,
    Json,
}

/// Prints steps once the engine yields a question.
pub struct WizardPresenter {
    verbosity: Verbosity,
    mode: RenderMode,
    header_printed: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, mode: RenderMode) -> Self {
        Self {
            verbosity,
            mode,
            header_printed: false,
        }
    }

    pub fn show_header(&mut self, view: &StepView) {
        if self.header_printed {
            return;
        }
        println!("Funnel: {}", view.funnel_name);
        if self.verbosity.is_verbose() {
            println!("Theme: {}", view.theme);
            println!("Commands: :back, :quit");
        }
        self.header_printed = true;
    }

    pub fn show_step(&self, view: &StepView) {
        match self.mode {
            RenderMode::Text => println!("{}", render_text(view)),
            RenderMode::Json => println!("{}", render_json(view)),
        }
        if self.verbosity.is_verbose()
            && let Some(question) = &view.question
        {
            println!("(question {} expects {})", question.id, question.shape);
        }
    }

    pub fn show_field_prompt(&self, label: &str, required: bool) {
        if required {
            println!("{} *", label);
        } else {
            println!("{}", label);
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if self.verbosity.is_verbose()
            && let Some(debug) = &error.debug_message
        {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_errors(&self, errors: &[String]) {
        for error in errors {
            eprintln!("  ! {}", error);
        }
    }

    pub fn show_notice(&self, message: &str) {
        eprintln!("{}", message);
    }

    pub fn show_completion(&self, view: &StepView, submission: Option<&Submission>) {
        println!("{}", render_text(view));
        let Some(submission) = submission else {
            return;
        };
        match submission.answers.to_json_pretty() {
            Ok(pretty) => println!("{}", pretty),
            Err(err) => eprintln!("Failed to serialize answers to JSON: {}", err),
        }
        if self.verbosity.is_verbose() {
            println!(
                "Completed in {}s ({} events)",
                submission.completion_time, submission.metadata.event_count
            );
        }
    }
}

/// One line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Back,
    Quit,
    Line(String),
}

impl Input {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            ":back" => Input::Back,
            ":quit" | ":q" => Input::Quit,
            other => Input::Line(other.to_string()),
        }
    }
}

/// Line reader over stdin or any buffered source. End of input reads as `:quit`.
pub struct Prompter<R> {
    reader: R,
}

impl<R: BufRead> Prompter<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn read(&mut self) -> io::Result<Input> {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(Input::Quit);
        }
        Ok(Input::parse(&line))
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

/// Turns one line into an answer for a non-field question.
///
/// Choices may be given by 1-based number, id or label. Blank input submits an
/// empty answer so the engine reports required errors itself.
pub fn parse_answer(question: &QuestionSpec, raw: &str) -> Result<AnswerValue, AnswerParseError> {
    let raw = raw.trim();
    match question.answer_shape() {
        AnswerShape::Text => Ok(AnswerValue::Text(raw.to_string())),
        AnswerShape::SingleChoice => {
            if raw.is_empty() {
                return Ok(AnswerValue::Choice(String::new()));
            }
            resolve_choice(question, raw).map(AnswerValue::Choice)
        }
        AnswerShape::MultiChoice => raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| resolve_choice(question, token))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(AnswerValue::Choices),
        AnswerShape::Fields => Err(AnswerParseError::new(
            "This question is answered field by field.",
            None,
        )),
    }
}

fn resolve_choice(question: &QuestionSpec, token: &str) -> Result<String, AnswerParseError> {
    let choices = &question.options.choices;
    if let Ok(number) = token.parse::<usize>()
        && let Some(choice) = number.checked_sub(1).and_then(|index| choices.get(index))
    {
        return Ok(choice.id.clone());
    }
    choices
        .iter()
        .find(|choice| choice.id == token || choice.label.eq_ignore_ascii_case(token))
        .map(|choice| choice.id.clone())
        .ok_or_else(|| {
            let allowed = choices
                .iter()
                .map(|choice| choice.id.as_str())
                .collect::<Vec<_>>();
            AnswerParseError::new(
                format!("'{}' is not one of the options.", token),
                Some(format!("number 1-{} or one of: {}", choices.len(), allowed.join(", "))),
            )
        })
}

/// Collects field values into a fields answer, dropping blanks.
pub fn fields_answer(values: Vec<(String, String)>) -> AnswerValue {
    AnswerValue::Fields(
        values
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect::<BTreeMap<_, _>>(),
    )
}
