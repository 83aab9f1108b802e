//! The question-answer flow and the terminal chat surfaces.
//!
//! [`answer_question`] is the single path every surface (CLI REPL, one-shot
//! ask, HTTP server) goes through: select grounding, assemble the payload,
//! call the synthesis service, and commit the turn to session history only
//! on success. A failed call leaves the session exactly as it was.

use anyhow::{bail, Result};
use std::io::{BufRead, Write};

use crate::config::Config;
use crate::corpus::{Corpus, CorpusStore};
use crate::extract::ExtractorRegistry;
use crate::prompt::{assemble, ConversationTurn, DEFAULT_SYSTEM_INSTRUCTION};
use crate::retrieval::Retriever;
use crate::synthesis::SynthesisClient;

/// Per-conversation state: the committed turns, oldest first. Lives only as
/// long as the session; nothing is persisted.
#[derive(Default)]
pub struct ChatSession {
    turns: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }
}

/// Answer one question against the given corpus version.
///
/// The new question participates in payload assembly but is committed to the
/// session (together with the answer) only after synthesis succeeds, so a
/// timeout or service error cannot leave a question without its answer in
/// the history.
pub async fn answer_question(
    config: &Config,
    corpus: &Corpus,
    retriever: &Retriever,
    client: &dyn SynthesisClient,
    session: &mut ChatSession,
    question: &str,
) -> Result<String> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question is empty");
    }

    let grounding = retriever.grounding(config, corpus, question).await?;
    let instruction = config
        .chat
        .system_instruction
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_INSTRUCTION);

    let mut pending = session.turns.clone();
    pending.push(ConversationTurn::user(question));
    let payload = assemble(instruction, &grounding, &pending, config.chat.history_window);

    let answer = client.complete(&payload).await?;

    session.turns.push(ConversationTurn::user(question));
    session.turns.push(ConversationTurn::assistant(&answer));
    Ok(answer)
}

/// Check the submitted password against the shared secret from the
/// environment. Plain comparison; there is no account model behind this.
pub fn password_matches(config: &Config, submitted: &str) -> Result<bool> {
    let expected = std::env::var(&config.auth.password_env).map_err(|_| {
        anyhow::anyhow!(
            "{} environment variable not set",
            config.auth.password_env
        )
    })?;
    Ok(!expected.is_empty() && submitted == expected)
}

/// Interactive REPL: password gate, then a read-answer loop until EOF or
/// `exit`/`quit`. Wrong passwords re-prompt indefinitely; a failed answer is
/// printed and the loop continues with history intact.
pub async fn run_chat(
    config: &Config,
    store: &CorpusStore,
    client: &dyn SynthesisClient,
) -> Result<()> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("password: ");
        stdout.flush()?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        if password_matches(config, line?.trim())? {
            break;
        }
        eprintln!("incorrect password");
    }

    let snapshot = store.snapshot().await;
    println!(
        "ready: {} documents, corpus version {} (exit or quit to leave)",
        snapshot.corpus.files.len(),
        snapshot.version
    );

    let mut session = ChatSession::new();
    loop {
        print!("> ");
        stdout.flush()?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let question = line?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            return Ok(());
        }

        let snapshot = store.snapshot().await;
        match answer_question(
            config,
            &snapshot.corpus,
            &snapshot.retriever,
            client,
            &mut session,
            question,
        )
        .await
        {
            Ok(answer) => println!("{}\n", answer),
            Err(e) => eprintln!("error: {}", e),
        }
    }
}

/// One-shot question with no session history. Operator path, not gated.
pub async fn run_ask(
    config: &Config,
    registry: &ExtractorRegistry,
    client: &dyn SynthesisClient,
    question: &str,
) -> Result<()> {
    let store = CorpusStore::initialize(config, registry).await?;
    let snapshot = store.snapshot().await;
    let mut session = ChatSession::new();
    let answer = answer_question(
        config,
        &snapshot.corpus,
        &snapshot.retriever,
        client,
        &mut session,
        question,
    )
    .await?;
    println!("{}", answer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{ChatMessage, Role};
    use crate::synthesis::SynthesisError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CapturingClient {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        reply: String,
    }

    impl CapturingClient {
        fn new(reply: &str) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                reply: reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl SynthesisClient for CapturingClient {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SynthesisError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(self.reply.clone())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl SynthesisClient for FailingClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, SynthesisError> {
            Err(SynthesisError::Timeout)
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            documents: crate::config::DocumentsConfig {
                dir: dir.to_path_buf(),
                exclude_globs: Vec::new(),
            },
            retrieval: Default::default(),
            embedding: Default::default(),
            synthesis: Default::default(),
            chat: Default::default(),
            server: Default::default(),
            auth: Default::default(),
        }
    }

    async fn fixture(
        text: &str,
    ) -> (Config, tempfile::TempDir, crate::corpus::Corpus, Retriever) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), text).unwrap();
        let config = test_config(dir.path());
        let registry = ExtractorRegistry::with_defaults();
        let corpus = crate::corpus::build_corpus(&config, &registry).unwrap();
        let retriever = Retriever::build(&config, &corpus).await.unwrap();
        (config, dir, corpus, retriever)
    }

    #[tokio::test]
    async fn answer_commits_both_turns_on_success() {
        let (config, _dir, corpus, retriever) = fixture("The office opens at 9 AM.").await;
        let client = CapturingClient::new("9 AM");
        let mut session = ChatSession::new();

        let answer = answer_question(
            &config,
            &corpus,
            &retriever,
            &client,
            &mut session,
            "When does the office open?",
        )
        .await
        .unwrap();

        assert_eq!(answer, "9 AM");
        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.turns()[0].role, Role::User);
        assert_eq!(session.turns()[1].role, Role::Assistant);
        assert_eq!(session.turns()[1].text, "9 AM");
    }

    #[tokio::test]
    async fn grounding_reaches_the_payload_verbatim() {
        let (config, _dir, corpus, retriever) = fixture("The office opens at 9 AM.").await;
        let client = CapturingClient::new("ok");
        let mut session = ChatSession::new();

        answer_question(
            &config,
            &corpus,
            &retriever,
            &client,
            &mut session,
            "hours?",
        )
        .await
        .unwrap();

        let seen = client.seen.lock().unwrap();
        let payload = &seen[0];
        assert_eq!(payload[0].role, Role::System);
        assert!(payload[0].content.contains("The office opens at 9 AM."));
        // The new question rides in the payload even before it is committed.
        assert_eq!(payload.last().unwrap().content, "hours?");
    }

    #[tokio::test]
    async fn failed_synthesis_leaves_history_untouched() {
        let (config, _dir, corpus, retriever) = fixture("content").await;
        let mut session = ChatSession::new();

        let ok = CapturingClient::new("first answer");
        answer_question(&config, &corpus, &retriever, &ok, &mut session, "q1")
            .await
            .unwrap();
        assert_eq!(session.turns().len(), 2);

        let err = answer_question(
            &config,
            &corpus,
            &retriever,
            &FailingClient,
            &mut session,
            "q2",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(session.turns().len(), 2);
    }

    #[tokio::test]
    async fn empty_question_is_rejected_without_a_service_call() {
        let (config, _dir, corpus, retriever) = fixture("content").await;
        let client = CapturingClient::new("ok");
        let mut session = ChatSession::new();

        let err = answer_question(&config, &corpus, &retriever, &client, &mut session, "   ")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(client.seen.lock().unwrap().is_empty());
        assert!(session.turns().is_empty());
    }
}
