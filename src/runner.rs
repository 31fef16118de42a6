//! Per-file evaluation workflow.
//!
//! Loads a spreadsheet, obtains both models' conversations (recorded or
//! generated), judges them and writes the results file.

use crate::analysis::{conversation_wins, run_averages};
use crate::config::Config;
use crate::judge::{ArenaJudge, ConversationJudge};
use crate::llm::{ChatModel, ClientConfig, OpenAiClient, ResponseGenerator};
use crate::loader::ConversationLoader;
use crate::models::{
    ConversationResult, EvaluationMode, EvaluationRun, TestCase, Turn, MODEL_A_LABEL,
    MODEL_B_LABEL,
};
use crate::report::{self, spreadsheet};
use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Characters of the system prompt kept in the results file.
const SYSTEM_PROMPT_PREVIEW: usize = 200;

/// The three chat endpoints an evaluation talks to.
pub struct Models {
    pub model_a: Arc<dyn ChatModel>,
    pub model_b: Arc<dyn ChatModel>,
    pub judge: Arc<dyn ChatModel>,
}

impl Models {
    /// OpenAI-compatible clients for the configured models and judge.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.judge.timeout_seconds;
        let model_a = OpenAiClient::new(ClientConfig::for_model(&config.base_model, timeout))
            .context("Failed to create Model A client")?;
        let model_b = OpenAiClient::new(ClientConfig::for_model(&config.finetuned_model, timeout))
            .context("Failed to create Model B client")?;
        let judge = OpenAiClient::new(ClientConfig::for_judge(&config.judge))
            .context("Failed to create judge client")?;
        Ok(Self {
            model_a: Arc::new(model_a),
            model_b: Arc::new(model_b),
            judge: Arc::new(judge),
        })
    }
}

/// What came out of evaluating one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub results_path: PathBuf,
    pub run: EvaluationRun,
}

/// Read the system prompt file, trimmed. A missing file yields an empty prompt.
pub fn load_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let prompt = content.trim().to_string();
            info!("Loaded system prompt ({} chars) from {}", prompt.chars().count(), path.display());
            prompt
        }
        Err(e) => {
            warn!(
                "System prompt file {} could not be read ({}); continuing without",
                path.display(),
                e
            );
            String::new()
        }
    }
}

/// Base name for a spreadsheet's outputs.
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "results".to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Print what a file would be evaluated as, without calling any model.
pub fn dry_run(path: &Path, requested: EvaluationMode) -> Result<()> {
    let loader = ConversationLoader::open(path)?;
    let mode = loader.resolve_mode(requested);

    println!("\n📄 {}", path.display());
    println!("   Mode: {}", mode);
    match mode {
        EvaluationMode::Prerecorded => {
            let pairs = loader.conversations_prerecorded();
            println!("   Conversations with both replies: {}", pairs.len());
            for pair in &pairs {
                println!(
                    "     • Row {}: {} prior turns, query: {}",
                    pair.row_index + 1,
                    pair.initial_turns.len(),
                    pair.user_query
                );
            }
        }
        _ => {
            let requests = loader.conversations_for_generation();
            println!("   Conversations to generate: {}", requests.len());
            for request in &requests {
                println!(
                    "     • Row {}: {} prior turns, query: {}",
                    request.row_index + 1,
                    request.initial_turns.len(),
                    request.user_query
                );
            }
        }
    }
    Ok(())
}

/// Evaluates spreadsheets with one set of models.
pub struct EvaluationRunner {
    models: Models,
    judge: ConversationJudge,
    arena: Option<ArenaJudge>,
    system_prompt: String,
    output_dir: PathBuf,
    quiet: bool,
}

impl EvaluationRunner {
    pub fn new(config: &Config, models: Models, quiet: bool) -> Self {
        let judge = ConversationJudge::new(models.judge.clone(), &config.judge);
        let arena = config
            .judge
            .arena
            .then(|| ArenaJudge::new(models.judge.clone()));
        Self {
            system_prompt: load_system_prompt(Path::new(&config.general.system_prompt)),
            output_dir: PathBuf::from(&config.general.output_dir),
            models,
            judge,
            arena,
            quiet,
        }
    }

    /// Evaluate one spreadsheet and write `<stem>_results.json` plus its
    /// formatted views.
    pub async fn evaluate_file(&self, path: &Path, requested: EvaluationMode) -> Result<FileOutcome> {
        let loader = ConversationLoader::open(path)?;
        let mode = loader.resolve_mode(requested);
        let name = file_name(path);
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        println!("\n📄 Evaluating {} ({} mode)", name, mode);
        println!("   Judge: {}", self.judge.model_name());
        println!("   Metrics: {}", self.judge.metric_names().join(", "));

        let conversations = match mode {
            EvaluationMode::Prerecorded => self.evaluate_prerecorded(&loader, &name).await,
            _ => self.evaluate_generated(&loader, &name).await?,
        };

        let run = EvaluationRun {
            file: name,
            mode,
            timestamp: Utc::now(),
            judge_model: self.judge.model_name().to_string(),
            system_prompt: (!self.system_prompt.is_empty())
                .then(|| self.system_prompt.chars().take(SYSTEM_PROMPT_PREVIEW).collect()),
            total_conversations: conversations.len(),
            conversations,
        };

        let results_path = self
            .output_dir
            .join(format!("{}{}", file_stem(path), report::RESULTS_SUFFIX));
        report::write_json(&run, &results_path)?;
        println!("   ✓ Saved: {}", results_path.display());

        match report::format_results(&results_path, None) {
            Ok(paths) => {
                for p in paths {
                    println!("   ✓ Created: {}", p.display());
                }
            }
            Err(e) => warn!("Failed to format {}: {:#}", results_path.display(), e),
        }

        print_summary(&run);
        Ok(FileOutcome { results_path, run })
    }

    async fn evaluate_prerecorded(
        &self,
        loader: &ConversationLoader,
        name: &str,
    ) -> Vec<ConversationResult> {
        let pairs = loader.conversations_prerecorded();
        if pairs.is_empty() {
            warn!("No rows with a user query and both replies in {}", name);
        }

        let pb = progress_bar(pairs.len(), self.quiet);
        let mut results = Vec::with_capacity(pairs.len());
        for (i, pair) in pairs.into_iter().enumerate() {
            pb.set_message(format!("conversation {}", i + 1));
            let mut model_a = pair.model_a;
            let mut model_b = pair.model_b;
            model_a.apply_system_prompt(&self.system_prompt);
            model_b.apply_system_prompt(&self.system_prompt);

            let result = self
                .judge_pair(
                    format!("{} - Conversation {}", name, i + 1),
                    pair.row_index,
                    pair.user_query,
                    pair.initial_turns,
                    model_a,
                    model_b,
                )
                .await;
            results.push(result);
            pb.inc(1);
        }
        pb.finish_with_message("Evaluation complete");
        results
    }

    async fn evaluate_generated(
        &self,
        loader: &ConversationLoader,
        name: &str,
    ) -> Result<Vec<ConversationResult>> {
        let requests = loader.conversations_for_generation();
        if requests.is_empty() {
            warn!("No rows with a user query in {}", name);
        }

        let generator_a = ResponseGenerator::new(self.models.model_a.clone());
        let generator_b = ResponseGenerator::new(self.models.model_b.clone());
        println!("   Model A: {}", generator_a.model_name());
        println!("   Model B: {}", generator_b.model_name());

        let pb = progress_bar(requests.len(), self.quiet);
        let mut results = Vec::with_capacity(requests.len());
        let mut replies = Vec::with_capacity(requests.len());
        for (i, request) in requests.into_iter().enumerate() {
            pb.set_message(format!("conversation {}", i + 1));
            let prompt = request.prompt_turns(&self.system_prompt);
            debug!("Generating row {} from {} turns", request.row_index, prompt.len());

            let (turns_a, turns_b) = futures::join!(
                generator_a.generate_conversation(&prompt),
                generator_b.generate_conversation(&prompt)
            );

            let build = |turns: Vec<Turn>| {
                let mut case = TestCase::new(turns, &request.metadata);
                case.apply_system_prompt(&self.system_prompt);
                case
            };
            let model_a = build(turns_a);
            let model_b = build(turns_b);

            replies.push(spreadsheet::GeneratedReplies {
                row_index: request.row_index,
                model_a: model_a.last_assistant_reply().map(str::to_string),
                model_b: model_b.last_assistant_reply().map(str::to_string),
            });

            let result = self
                .judge_pair(
                    format!("{} - Conversation {}", name, i + 1),
                    request.row_index,
                    request.user_query,
                    request.initial_turns,
                    model_a,
                    model_b,
                )
                .await;
            results.push(result);
            pb.inc(1);
        }
        pb.finish_with_message("Evaluation complete");

        let with_responses = self
            .output_dir
            .join(format!("{}_with_responses.xlsx", file_stem(loader.path())));
        spreadsheet::write_workbook(
            &[spreadsheet::with_responses(loader.table(), &replies)],
            &with_responses,
        )?;
        println!("   ✓ Saved: {}", with_responses.display());

        Ok(results)
    }

    async fn judge_pair(
        &self,
        test_case_name: String,
        row_index: usize,
        user_query: String,
        initial_conversation: Vec<Turn>,
        model_a: TestCase,
        model_b: TestCase,
    ) -> ConversationResult {
        let arena = match self.arena {
            Some(ref arena) => match arena.compare(&model_a, &model_b).await {
                Ok(verdict) => Some(verdict),
                Err(e) => {
                    warn!("Arena comparison failed for {}: {}", test_case_name, e);
                    None
                }
            },
            None => None,
        };

        let (model_a_evaluation, model_b_evaluation) = futures::join!(
            self.judge
                .evaluate_model(MODEL_A_LABEL, self.models.model_a.model_name(), model_a),
            self.judge
                .evaluate_model(MODEL_B_LABEL, self.models.model_b.model_name(), model_b)
        );

        ConversationResult {
            test_case_name,
            row_index,
            user_query,
            initial_conversation,
            model_a_evaluation,
            model_b_evaluation,
            arena,
        }
    }
}

/// Print the per-file summary.
pub fn print_summary(run: &EvaluationRun) {
    let (avg_a, avg_b) = run_averages(run);
    let wins = conversation_wins(run);
    let score = |s: Option<f64>| s.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "n/a".to_string());

    println!("\n📊 Evaluation Summary:");
    println!("   Conversations: {}", run.total_conversations);
    println!("   {} average: {}", MODEL_A_LABEL, score(avg_a));
    println!("   {} average: {}", MODEL_B_LABEL, score(avg_b));
    println!(
        "   Wins - Model A: {} | Model B: {} | Ties: {}",
        wins.model_a, wins.model_b, wins.ties
    );
    println!("   Model B win rate: {:.1}%", wins.model_b_rate());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::judge::testing::ScriptedJudge;
    use crate::loader::SheetTable;
    use rust_xlsxwriter::Workbook;

    fn judge() -> Arc<ScriptedJudge> {
        Arc::new(ScriptedJudge::new(vec![
            ("retains information", r#"{"verdicts": []}"#),
            ("last assistant message", r#"{"verdict": "yes"}"#),
            ("Assigned role", r#"{"out_of_character": []}"#),
            ("extracting what a user wants", r#"{"intentions": ["track order"]}"#),
            ("satisfied each user intention", r#"{"verdicts": [{"verdict": "yes"}]}"#),
        ]))
    }

    fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.general.output_dir = dir.join("results").display().to_string();
        config.general.system_prompt = dir.join("missing_prompt.txt").display().to_string();
        config.judge.use_all_metrics = false;
        config
    }

    fn write_sheet(path: &Path, headers: &[&str], rows: &[&[&str]]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (c, h) in headers.iter().enumerate() {
            sheet.write_string(0, c as u16, *h).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                sheet.write_string(r as u32 + 1, c as u16, *v).unwrap();
            }
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn test_load_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "  You are a travel agent.\n").unwrap();
        assert_eq!(load_system_prompt(&path), "You are a travel agent.");
        assert_eq!(load_system_prompt(&dir.path().join("nope.txt")), "");

        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/system_prompt.txt");
        let prompt = load_system_prompt(&fixture);
        assert!(prompt.starts_with("You are a customer support assistant"));
        assert!(!prompt.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_evaluate_prerecorded_file() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("support.xlsx");
        write_sheet(
            &sheet,
            &["User Query", "Model A Response", "Model B Response"],
            &[
                &["Where is my order?", "No idea.", "It ships tomorrow."],
                &["", "ignored", "ignored"],
            ],
        );

        let models = Models {
            model_a: Arc::new(ScriptedJudge::new(vec![])),
            model_b: Arc::new(ScriptedJudge::new(vec![])),
            judge: judge(),
        };
        let runner = EvaluationRunner::new(&config(dir.path()), models, true);
        let outcome = runner
            .evaluate_file(&sheet, EvaluationMode::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.run.mode, EvaluationMode::Prerecorded);
        assert_eq!(outcome.run.total_conversations, 1);
        let conversation = &outcome.run.conversations[0];
        assert_eq!(conversation.test_case_name, "support.xlsx - Conversation 1");
        assert_eq!(conversation.model_a_evaluation.metrics.len(), 4);
        assert!(conversation.arena.is_none());

        let results = dir.path().join("results");
        assert!(outcome.results_path.ends_with("support_results.json"));
        assert!(results.join("support_metrics_only.json").exists());
        assert!(results.join("support_summary.md").exists());
        assert!(!results.join("support_with_responses.xlsx").exists());
    }

    #[tokio::test]
    async fn test_evaluate_generated_file_writes_responses() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("travel.xlsx");
        write_sheet(
            &sheet,
            &["Initial Conversation", "User Query", "Chatbot Role"],
            &[&[
                r#"[{"role": "user", "content": "Hi"}, {"role": "assistant", "content": "Hello!"}]"#,
                "Book me a flight",
                "travel agent",
            ]],
        );

        let model_a = Arc::new(ScriptedJudge::new(vec![("", "Where to?")]));
        let model_b = Arc::new(ScriptedJudge::new(vec![("", "Sure, from which city?")]));
        let models = Models {
            model_a: model_a.clone(),
            model_b,
            judge: judge(),
        };
        let mut config = config(dir.path());
        config.judge.arena = true;
        let runner = EvaluationRunner::new(&config, models, true);
        let outcome = runner
            .evaluate_file(&sheet, EvaluationMode::Auto)
            .await
            .unwrap();

        assert_eq!(outcome.run.mode, EvaluationMode::Generate);
        assert_eq!(model_a.calls(), 1);
        let conversation = &outcome.run.conversations[0];
        assert_eq!(conversation.initial_conversation.len(), 2);
        let case_b = &conversation.model_b_evaluation.test_case;
        assert_eq!(case_b.turns.len(), 4);
        assert_eq!(case_b.last_assistant_reply(), Some("Sure, from which city?"));
        assert_eq!(case_b.chatbot_role.as_deref(), Some("travel agent"));
        // The scripted judge has no arena rule
        assert!(conversation.arena.is_none());

        let table =
            SheetTable::open(&dir.path().join("results/travel_with_responses.xlsx")).unwrap();
        assert_eq!(table.cell(0, "Model A Response"), Some("Where to?"));
        assert_eq!(table.cell(0, "Model B Response"), Some("Sure, from which city?"));
        assert_eq!(table.cell(0, "User Query"), Some("Book me a flight"));
    }

    #[test]
    fn test_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("plan.xlsx");
        write_sheet(&sheet, &["User Query"], &[&["Hello"]]);
        assert!(dry_run(&sheet, EvaluationMode::Auto).is_ok());
        assert!(dry_run(&dir.path().join("missing.xlsx"), EvaluationMode::Auto).is_err());
    }
}
