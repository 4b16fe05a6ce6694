//! CLI interface for voice-assistant

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::assistant::actions::{BrowserSearch, MailTransport, UnavailableMail};
use crate::assistant::gmail::GmailMail;
use crate::assistant::io::{ConsoleInput, ConsoleOutput};
use crate::assistant::preferences::PreferencesStore;
use crate::assistant::Assistant;
use crate::config::{self, Config};
use crate::learning::{EngineSettings, JsonFileBackend, PersonalizationEngine};

#[derive(Parser)]
#[command(name = "voice-assistant")]
#[command(about = "Voice command assistant that learns which responses work for you", long_about = None)]
#[command(version)]
struct Cli {
    /// Learning data file (overrides the config file)
    #[arg(long, env = "VOICE_ASSISTANT_DATA", global = true)]
    data_file: Option<PathBuf>,

    /// Address mail is sent from
    #[arg(long, env = "SENDER_EMAIL", global = true)]
    sender_email: Option<String>,

    /// Subject for dictated mail
    #[arg(long, env = "DEFAULT_SUBJECT", global = true)]
    default_subject: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the assistant (default when no command given)
    Run,
    /// Inspect or reset what the assistant has learned
    Learning {
        #[command(subcommand)]
        command: LearningCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum LearningCommands {
    /// Show learning statistics
    Stats,
    /// Show everything recorded for a phrase
    Show {
        phrase: String,
    },
    /// Ask for a personalized response as the assistant would
    Lookup {
        phrase: String,
    },
    /// Forget everything learned
    Reset,
    /// Print the learning data file location
    Path,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the default configuration
    Init,
}

impl Cli {
    /// Flags and environment variables win over the config file
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.data_file {
            config.learning.data_file = Some(path.clone());
        }
        if let Some(sender) = &self.sender_email {
            config.mail.sender_email = Some(sender.clone());
        }
        if let Some(subject) = &self.default_subject {
            config.mail.default_subject = subject.clone();
        }
    }
}

fn open_engine(config: &Config) -> Result<PersonalizationEngine<JsonFileBackend>> {
    let backend = JsonFileBackend::new(config.learning.data_path()?);
    Ok(PersonalizationEngine::open(backend, EngineSettings::from(&config.learning)))
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    cli.apply_overrides(&mut config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_assistant(config).await,
        Commands::Learning { command } => run_learning(command, &config),
        Commands::Config { command } => match command {
            ConfigCommands::Show => config::show_config(&config),
            ConfigCommands::Init => {
                print!("{}", config::default_config_toml());
                Ok(())
            }
        },
    }
}

fn mail_transport(config: &Config) -> Box<dyn MailTransport> {
    match GmailMail::from_config(&config.mail) {
        Ok(gmail) if gmail.is_configured() => Box::new(gmail),
        Ok(_) => {
            info!("Gmail sender or credentials not set, mail commands disabled");
            Box::new(UnavailableMail)
        }
        Err(e) => {
            warn!("Failed to initialize Gmail: {}", e);
            Box::new(UnavailableMail)
        }
    }
}

async fn run_assistant(config: Config) -> Result<()> {
    let engine = open_engine(&config)?;
    let preferences = PreferencesStore::open(config.preferences.path()?);

    let mut assistant = Assistant::new(ConsoleInput::new(), ConsoleOutput, engine)
        .with_search(Box::new(BrowserSearch::from_config(&config.search)))
        .with_mail(mail_transport(&config), config.mail.clone())
        .with_preferences(preferences);

    assistant.run().await;
    Ok(())
}

fn run_learning(command: LearningCommands, config: &Config) -> Result<()> {
    match command {
        LearningCommands::Stats => {
            let engine = open_engine(config)?;
            let data = engine.store().data();
            println!("Learning Statistics");
            println!("===================");
            println!("Total interactions:  {}", data.total_interactions);
            println!("Phrases learned:     {}", data.learning_progress.phrases_learned);
            println!("Successful commands: {}", data.learning_progress.successful_commands);
            println!("Patterns recognized: {}", data.learning_progress.patterns_recognized);
            println!("Last updated:        {}", data.last_updated.format("%Y-%m-%d %H:%M UTC"));
            println!();

            let mut phrases: Vec<_> = data.common_phrases.iter().collect();
            phrases.sort_by(|a, b| b.1.occurrence_count.cmp(&a.1.occurrence_count));
            if !phrases.is_empty() {
                println!("Most frequent phrases:");
                for (phrase, record) in phrases.iter().take(10) {
                    println!(
                        "  {:<32} x{:<4} success {:.2}",
                        phrase, record.occurrence_count, record.success_rate
                    );
                }
                println!();
            }

            let busiest = data.time_based_patterns.iter().max_by_key(|(_, entries)| entries.len());
            if let Some((hour, entries)) = busiest {
                println!("Busiest hour: {:02}:00 ({} interactions)", hour, entries.len());
            }
            println!("Store: {}", engine.store().backend().path().display());
        }
        LearningCommands::Show { phrase } => {
            let engine = open_engine(config)?;
            let key = crate::learning::normalize(&phrase);
            match engine.phrase(&key) {
                Some(record) => {
                    println!("Phrase:      {}", key);
                    println!("Occurrences: {}", record.occurrence_count);
                    println!("Success:     {:.3}", record.success_rate);
                    println!("Last used:   {}", record.last_used.format("%Y-%m-%d %H:%M UTC"));
                    println!(
                        "First seen:  {} at {:02}:00",
                        record.first_seen_context.day, record.first_seen_context.hour
                    );
                    if let Some(counts) = engine.store().data().command_success_rate.get(&key) {
                        println!(
                            "Outcomes:    {}/{} successful ({:.0}%)",
                            counts.successful,
                            counts.total,
                            counts.ratio() * 100.0
                        );
                    }
                    println!("Responses:");
                    for response in &record.responses {
                        println!("  - {}", response);
                    }
                }
                None => println!("Nothing learned for '{}'", key),
            }
        }
        LearningCommands::Lookup { phrase } => {
            let mut engine = open_engine(config)?;
            match engine.get_personalized_response(&phrase, &mut rand::rng()) {
                Some(response) => println!("{}", response),
                None => println!("No personalized response for '{}'", phrase.trim()),
            }
        }
        LearningCommands::Reset => {
            let mut engine = open_engine(config)?;
            if engine.store_mut().reset() {
                println!("Learning data reset.");
            } else {
                anyhow::bail!("Failed to write {}", engine.store().backend().path().display());
            }
        }
        LearningCommands::Path => {
            println!("{}", config.learning.data_path()?.display());
        }
    }
    Ok(())
}
