//! Voice command assistant
//!
//! Ties speech I/O, the keyword classifier, the actions and the
//! personalization engine together. Every utterance goes through the same
//! path: ask the engine for a learned response, otherwise run the matched
//! action, speak the result, and report the outcome back to the engine.

pub mod actions;
pub mod classifier;
pub mod gmail;
pub mod io;
pub mod preferences;
pub mod reminders;
pub mod spoken_email;

use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::{MailConfig, SearchConfig};
use crate::learning::{normalize, PersonalizationEngine, StorageBackend};

use actions::{BrowserSearch, MailTransport, UnavailableMail, WebSearch};
use classifier::{classify, Command};
use io::{SpeechInput, SpeechOutput};
use preferences::{PreferencesStore, SavedReminder};
use reminders::{ReminderBook, ReminderError};
use spoken_email::format_email_address;

pub const READY_MESSAGE: &str = "Voice assistant is ready. How can I help you?";
pub const GREETING_RESPONSE: &str = "Hello! How can I assist you today?";
pub const GOODBYE_RESPONSE: &str = "Goodbye! Have a great day!";
pub const FALLBACK_RESPONSE: &str = "I'm not sure I understand. Could you please rephrase that?";
pub const MAIL_UNAVAILABLE_RESPONSE: &str =
    "Mail service is not initialized. Please check your credentials.";

const EMAIL_ADDRESS_ATTEMPTS: usize = 3;

/// Result of handling one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Reply spoken to the user and recorded for learning
    pub response: String,
    pub success: bool,
    /// Extra lines spoken after the response (e.g. mail contents)
    pub details: Vec<String>,
    /// The response came from learned history
    pub cached: bool,
    /// The user asked to quit
    pub exit: bool,
}

impl Outcome {
    fn ok(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            success: true,
            details: Vec::new(),
            cached: false,
            exit: false,
        }
    }

    fn failed(response: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(response)
        }
    }
}

/// The assistant: one utterance at a time, start to finish
pub struct Assistant<I: SpeechInput, O: SpeechOutput, B: StorageBackend> {
    input: I,
    output: O,
    engine: PersonalizationEngine<B>,
    mail: Box<dyn MailTransport>,
    search: Box<dyn WebSearch>,
    mail_config: MailConfig,
    reminders: ReminderBook,
    preferences: Option<PreferencesStore>,
    rng: StdRng,
    input_closed: bool,
}

impl<I: SpeechInput, O: SpeechOutput, B: StorageBackend> Assistant<I, O, B> {
    pub fn new(input: I, output: O, engine: PersonalizationEngine<B>) -> Self {
        Self {
            input,
            output,
            engine,
            mail: Box::new(UnavailableMail),
            search: Box::new(BrowserSearch::from_config(&SearchConfig::default())),
            mail_config: MailConfig::default(),
            reminders: ReminderBook::new(),
            preferences: None,
            rng: StdRng::from_os_rng(),
            input_closed: false,
        }
    }

    pub fn with_mail(mut self, mail: Box<dyn MailTransport>, config: MailConfig) -> Self {
        info!("Using mail transport: {}", mail.name());
        self.mail = mail;
        self.mail_config = config;
        self
    }

    pub fn with_search(mut self, search: Box<dyn WebSearch>) -> Self {
        self.search = search;
        self
    }

    /// Persist reminders to the preferences file and bring back saved ones
    pub fn with_preferences(mut self, store: PreferencesStore) -> Self {
        self.reminders.restore(&store.preferences().reminders, Local::now());
        self.preferences = Some(store);
        self
    }

    /// Fixed random source for response selection
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Main loop: fire due reminders, listen, handle, until the user says
    /// goodbye or the input closes. Learning data is flushed on the way out.
    pub async fn run(&mut self) {
        self.output.speak(READY_MESSAGE).await;

        while !self.input_closed {
            for message in self.reminders.take_due(Local::now()) {
                self.output.speak(&message).await;
            }

            let Some(text) = self.listen().await else {
                break;
            };
            if let Some(outcome) = self.handle_utterance(&text).await {
                if outcome.exit {
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Handle one utterance. Returns `None` for empty input.
    pub async fn handle_utterance(&mut self, text: &str) -> Option<Outcome> {
        let utterance = normalize(text);
        if utterance.is_empty() {
            return None;
        }
        debug!("Processing command: {}", utterance);

        if let Some(response) = self.engine.get_personalized_response(&utterance, &mut self.rng) {
            self.output.speak(&response).await;
            self.engine.record_interaction(&utterance, &response, true);
            return Some(Outcome {
                cached: true,
                ..Outcome::ok(response)
            });
        }

        let outcome = self.classify_and_execute(&utterance).await;
        self.output.speak(&outcome.response).await;
        for line in &outcome.details {
            self.output.speak(line).await;
        }
        self.engine.record_interaction(&utterance, &outcome.response, outcome.success);
        Some(outcome)
    }

    /// Run the action the utterance maps to, without consulting history
    pub async fn classify_and_execute(&mut self, utterance: &str) -> Outcome {
        let command = classify(utterance);
        debug!("Matched {:?}", command);

        match command {
            Command::Greeting => Outcome::ok(GREETING_RESPONSE),
            Command::Time => Outcome::ok(format!(
                "The current time is {}",
                Local::now().format("%I:%M %p")
            )),
            Command::Date => Outcome::ok(format!(
                "Today is {}",
                Local::now().format("%A, %B %d, %Y")
            )),
            Command::Reminder => self.set_reminder().await,
            Command::Search(term) => self.search(term).await,
            Command::SendEmail => self.send_email().await,
            Command::CheckEmail => self.check_email().await,
            Command::Exit => Outcome {
                exit: true,
                ..Outcome::ok(GOODBYE_RESPONSE)
            },
            Command::Unknown => Outcome::failed(FALLBACK_RESPONSE),
        }
    }

    /// Save learning data now
    pub fn shutdown(&mut self) -> bool {
        self.engine.flush()
    }

    pub fn engine(&self) -> &PersonalizationEngine<B> {
        &self.engine
    }

    pub fn reminders(&self) -> &ReminderBook {
        &self.reminders
    }

    async fn listen(&mut self) -> Option<String> {
        let heard = self.input.transcribe().await;
        if heard.is_none() {
            self.input_closed = true;
        }
        heard
    }

    /// Speak a prompt and wait for the answer (empty if nothing was heard)
    async fn ask(&mut self, prompt: &str) -> String {
        self.output.speak(prompt).await;
        self.listen().await.unwrap_or_default().trim().to_string()
    }

    async fn set_reminder(&mut self) -> Outcome {
        let answer = self
            .ask("What time would you like to set the reminder for? Please say the time in 24-hour format, like 14:30.")
            .await;
        if answer.is_empty() {
            return Outcome::failed("No reminder time provided");
        }

        match self.reminders.schedule(&answer, Local::now()) {
            Ok(reminder) => {
                let saved = SavedReminder::from(reminder);
                let response = format!("Reminder set for {}", saved.time);
                if let Some(preferences) = self.preferences.as_mut() {
                    preferences.add_reminder(saved);
                }
                Outcome::ok(response)
            }
            Err(ReminderError::AlreadyPassed(_)) => {
                Outcome::failed("That time has already passed today.")
            }
            Err(ReminderError::InvalidFormat(_)) => {
                Outcome::failed("Please specify the time in HH:MM format, for example 14:30.")
            }
        }
    }

    async fn search(&mut self, term: String) -> Outcome {
        let term = if term.is_empty() {
            self.ask("What would you like me to search for?").await
        } else {
            term
        };
        if term.is_empty() {
            return Outcome::failed("No search term provided");
        }

        self.output.speak(&format!("Searching for {}", term)).await;
        match self.search.search(&term).await {
            Ok(()) => Outcome::ok(format!("Searched for {}", term)),
            Err(e) => {
                warn!("Search failed: {}", e);
                Outcome::failed(format!("I couldn't open the search for {}", term))
            }
        }
    }

    async fn get_email_address(&mut self) -> Option<String> {
        for _ in 0..EMAIL_ADDRESS_ATTEMPTS {
            let spoken = self.ask("Please provide the recipient's email address.").await;
            if self.input_closed {
                return None;
            }
            if spoken.is_empty() {
                self.output.speak("I didn't catch that. Please try again.").await;
                continue;
            }
            match format_email_address(&spoken) {
                Some(address) => {
                    self.output
                        .speak(&format!("I understood the email address as: {}", address))
                        .await;
                    return Some(address);
                }
                None => {
                    self.output
                        .speak("I couldn't understand the email address format. Please try again.")
                        .await;
                }
            }
        }
        None
    }

    async fn send_email(&mut self) -> Outcome {
        if !self.mail.is_configured() {
            return Outcome::failed(MAIL_UNAVAILABLE_RESPONSE);
        }

        let Some(to) = self.get_email_address().await else {
            return Outcome::failed("Failed to get a valid email address after multiple attempts.");
        };
        let body = self.ask("What should be the message?").await;
        if body.is_empty() {
            return Outcome::failed("No message provided, email not sent.");
        }

        match self.mail.send(&to, &self.mail_config.default_subject, &body).await {
            Ok(()) => {
                info!("Sent email to {}", to);
                Outcome::ok("Email sent successfully!")
            }
            Err(e) => {
                warn!("Failed to send email: {}", e);
                Outcome::failed("Failed to send email.")
            }
        }
    }

    async fn check_email(&mut self) -> Outcome {
        if !self.mail.is_configured() {
            return Outcome::failed(MAIL_UNAVAILABLE_RESPONSE);
        }

        self.output.speak("Reading your latest emails.").await;
        match self.mail.latest(self.mail_config.inbox_preview).await {
            Ok(messages) if !messages.is_empty() => {
                let details = messages
                    .iter()
                    .flat_map(|m| {
                        [
                            format!("From: {}", m.sender),
                            format!("Subject: {}", m.subject),
                            format!("Content: {}", m.content),
                        ]
                    })
                    .collect();
                Outcome {
                    details,
                    ..Outcome::ok(format!("You have {} recent emails.", messages.len()))
                }
            }
            Ok(_) => Outcome::failed("No emails found or there was an error reading your inbox."),
            Err(e) => {
                warn!("Failed to read inbox: {}", e);
                Outcome::failed("No emails found or there was an error reading your inbox.")
            }
        }
    }
}
