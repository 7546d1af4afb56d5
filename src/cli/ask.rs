use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use medassist::config::Config;
use medassist::controller::{AnalyzeOutcome, FollowUpOutcome, InteractionController};
use medassist::gateway::{AnalysisMode, ModelGateway, OpenAiGateway};
use medassist::prompts::PromptSet;
use medassist::session::StagedImage;

#[derive(Args)]
#[command(group(ArgGroup::new("input").required(true).args(["image", "symptoms"])))]
pub struct AskArgs {
    /// JPEG or PNG image to analyze
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Free-text symptom description to analyze
    #[arg(short, long)]
    pub symptoms: Option<String>,

    /// Follow-up question about the analysis (repeatable)
    #[arg(long = "follow-up", value_name = "QUESTION")]
    pub follow_up: Vec<String>,

    /// Keep asking follow-up questions at a prompt
    #[arg(long)]
    pub interactive: bool,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

#[derive(Serialize)]
struct AskOutput {
    mode: AnalysisMode,
    model: String,
    result: String,
    follow_ups: Vec<Exchange>,
}

#[derive(Serialize)]
struct Exchange {
    question: String,
    answer: String,
}

pub async fn run(args: AskArgs, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let prompts = PromptSet::from_config(&config.prompts)?;
    let gateway: Arc<dyn ModelGateway> = Arc::new(OpenAiGateway::from_config(&config, prompts)?);
    let (vision_model, text_model) = gateway.models();

    let mut controller = InteractionController::new(gateway);
    let json = args.format == "json";

    let (mode, outcome) = if let Some(path) = &args.image {
        let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
        let image = StagedImage::from_path(
            &path,
            config.uploads.max_file_size_bytes,
            &config.upload_dir(),
        )
        .with_context(|| format!("Cannot use image {}", path.display()))?;

        controller.select_mode(AnalysisMode::Image);
        controller.stage_image(image);
        (AnalysisMode::Image, controller.analyze(None).await?)
    } else {
        controller.select_mode(AnalysisMode::Symptom);
        (
            AnalysisMode::Symptom,
            controller.analyze(args.symptoms.as_deref()).await?,
        )
    };

    let result = match outcome {
        AnalyzeOutcome::Completed(text) => text,
        AnalyzeOutcome::Ignored(reason) => bail!("{}", reason),
    };

    if !json {
        println!("{}", result);
    }

    let mut exchanges = Vec::new();
    for question in &args.follow_up {
        if let Some(answer) = ask_follow_up(&mut controller, question).await? {
            if !json {
                print_exchange(question, &answer);
            }
            exchanges.push(Exchange {
                question: question.clone(),
                answer,
            });
        }
    }

    if args.interactive {
        exchanges.extend(interactive_loop(&mut controller, json).await?);
    }

    if json {
        let output = AskOutput {
            model: match mode {
                AnalysisMode::Image => vision_model,
                AnalysisMode::Symptom => text_model,
            },
            mode,
            result,
            follow_ups: exchanges,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

async fn ask_follow_up(
    controller: &mut InteractionController,
    question: &str,
) -> Result<Option<String>> {
    match controller.follow_up(question).await? {
        FollowUpOutcome::Answered(answer) => Ok(Some(answer)),
        FollowUpOutcome::Ignored(reason) => {
            eprintln!("Skipped follow-up: {}", reason);
            Ok(None)
        }
    }
}

fn print_exchange(question: &str, answer: &str) {
    println!("\nQ: {}\n", question);
    println!("{}", answer);
}

async fn interactive_loop(
    controller: &mut InteractionController,
    json: bool,
) -> Result<Vec<Exchange>> {
    let mut rl = DefaultEditor::new()?;
    let mut exchanges = Vec::new();

    eprintln!("\nAsk follow-up questions about the analysis. Ctrl+D to exit.\n");

    loop {
        let input = match rl.readline("Question: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                eprintln!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        };

        let question = input.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "/quit" | "/exit") {
            break;
        }
        let _ = rl.add_history_entry(question);

        // A failed call can be retried by asking again
        let answer = match controller.follow_up(question).await {
            Ok(FollowUpOutcome::Answered(answer)) => answer,
            Ok(FollowUpOutcome::Ignored(reason)) => {
                eprintln!("{}", reason);
                continue;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                continue;
            }
        };

        if json {
            eprintln!("{}\n", answer);
        } else {
            println!("\n{}\n", answer);
        }
        exchanges.push(Exchange {
            question: question.to_string(),
            answer,
        });
    }

    Ok(exchanges)
}
