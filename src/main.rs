use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use quantcoach::clock::SystemClock;
use quantcoach::config::Config;
use quantcoach::curriculum::KnowledgeGraph;
use quantcoach::generator::{CatalogGenerator, ContentGenerator, LLMProvider, LlmGenerator};
use quantcoach::logging::init_tracing;
use quantcoach::mastery::MasteryStore;
use quantcoach::persistence::FileProfileStore;
use quantcoach::session::{Reply, SessionEngine, SessionStatus};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level, config.log_dir.as_deref());

    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {err}");
        return ExitCode::FAILURE;
    }

    let graph = match &config.catalog_path {
        Some(path) => KnowledgeGraph::from_path(path),
        None => KnowledgeGraph::builtin(),
    };
    let graph = match graph {
        Ok(graph) => Arc::new(graph.with_unlock_threshold(config.unlock_threshold)),
        Err(err) => {
            eprintln!("failed to load curriculum: {err}");
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(FileProfileStore::new(config.profiles_dir()));
    let mastery = Arc::new(MasteryStore::new(
        Arc::clone(&graph),
        store,
        Arc::new(SystemClock),
        config.mastery.clone(),
    ));

    let generator: Arc<dyn ContentGenerator> = if config.llm.is_configured() {
        tracing::info!(model = %config.llm.model, "using LLM generator");
        Arc::new(LlmGenerator::new(LLMProvider::new(config.llm.clone())))
    } else {
        tracing::info!("no LLM_API_KEY set, using the offline question bank");
        Arc::new(CatalogGenerator::new())
    };

    let engine = SessionEngine::new(mastery, generator, config.session.clone());
    tracing::info!(
        learner_id = %config.learner_id,
        topics = graph.len(),
        data_dir = %config.data_dir.display(),
        "quantcoach started"
    );

    let learner = config.learner_id.as_str();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let reply = engine.start_session(learner).await;
    if print_reply(&mut stdout, &reply).await.is_err() || reply.status == SessionStatus::Ended {
        return ExitCode::FAILURE;
    }

    loop {
        let _ = stdout.write_all(b"\n> ").await;
        let _ = stdout.flush().await;

        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                Ok(None)
            }
        };

        let reply = match line {
            Ok(Some(text)) => engine.handle_message(learner, &text).await,
            Ok(None) => engine.end_session(learner).await,
            Err(err) => {
                tracing::error!(error = %err, "failed to read input");
                engine.end_session(learner).await
            }
        };
        if print_reply(&mut stdout, &reply).await.is_err() {
            break;
        }
        if reply.status == SessionStatus::Ended {
            break;
        }
    }

    ExitCode::SUCCESS
}

async fn print_reply(stdout: &mut tokio::io::Stdout, reply: &Reply) -> std::io::Result<()> {
    let mut out = String::new();
    for notice in &reply.notices {
        out.push_str(&format!("[!] {}\n", notice.message()));
    }
    out.push_str(&reply.display_text);
    out.push('\n');
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await
}
