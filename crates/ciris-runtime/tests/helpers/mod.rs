// ciris-runtime/tests/helpers/mod.rs
// ============================================================================
// Module: Runtime Test Harness
// Description: Deterministic harness with scripted DMAs and stub providers.
// ============================================================================
//! ## Overview
//! Builds a fully wired runtime over a manual clock, a temp-dir audit chain,
//! an in-memory store, scripted deterministic DMAs, and a recording
//! communication provider. Scenario tests drive rounds with `step`.

#![allow(
    dead_code,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Shared test helpers; not every test uses every item."
)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use ciris_audit::AuditChain;
use ciris_audit::AuditSigner;
use ciris_audit::Journal;
use ciris_audit::SigningAlgorithm;
use ciris_bus::BusBundle;
use ciris_bus::BusCore;
use ciris_core::ActionParams;
use ciris_core::AuditEntry;
use ciris_core::AuditEventType;
use ciris_core::ChannelId;
use ciris_core::ChatMessage;
use ciris_core::Clock;
use ciris_core::CommunicationCapability;
use ciris_core::Conscience;
use ciris_core::ConscienceFaculty;
use ciris_core::CorrelationStore;
use ciris_core::DmaContext;
use ciris_core::DmaPipeline;
use ciris_core::FacultyReport;
use ciris_core::GraphStore;
use ciris_core::IncomingMessage;
use ciris_core::ManualClock;
use ciris_core::PipelineConfig;
use ciris_core::PonderParams;
use ciris_core::Priority;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::SpeakParams;
use ciris_core::TaskCompleteParams;
use ciris_core::TaskId;
use ciris_core::TaskOutcome;
use ciris_core::Thought;
use ciris_core::Timestamp;
use ciris_core::dma::ActionSelectionContext;
use ciris_core::dma::ActionSelectionDma;
use ciris_core::dma::CommonSenseDma;
use ciris_core::dma::CommonSenseEvaluation;
use ciris_core::dma::DomainDma;
use ciris_core::dma::DomainEvaluation;
use ciris_core::dma::EthicalDma;
use ciris_core::dma::EthicalDecision;
use ciris_core::dma::EthicalEvaluation;
use ciris_registry::BreakerConfig;
use ciris_registry::ServiceProvider;
use ciris_registry::ServiceRegistry;
use ciris_runtime::CognitiveProcessor;
use ciris_runtime::HandlerContext;
use ciris_runtime::HandlerDispatcher;
use ciris_runtime::Ingress;
use ciris_runtime::LocalGraphMemory;
use ciris_runtime::ProcessorSettings;
use ciris_runtime::ShutdownHandle;
use ciris_store_sqlite::SqliteStore;
use tempfile::TempDir;

// ============================================================================
// SECTION: Stub Providers
// ============================================================================

/// Communication provider recording every delivery.
pub struct RecordingComm {
    /// Deliveries observed, in order.
    pub sends: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingComm {
    /// Creates the provider.
    pub fn new() -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of recorded deliveries.
    pub fn recorded(&self) -> Vec<(ChannelId, String)> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommunicationCapability for RecordingComm {
    async fn send_message(
        &self,
        channel_id: &ChannelId,
        content: &str,
    ) -> Result<bool, ServiceError> {
        self.sends.lock().unwrap().push((channel_id.clone(), content.to_string()));
        Ok(true)
    }

    async fn fetch_messages(
        &self,
        _channel_id: &ChannelId,
        _limit: usize,
    ) -> Result<Vec<ChatMessage>, ServiceError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// SECTION: Scripted DMAs
// ============================================================================

/// Ethical stub approving everything.
pub struct ApproveAll;

#[async_trait]
impl EthicalDma for ApproveAll {
    async fn evaluate(
        &self,
        _thought: &Thought,
        _context: &DmaContext,
    ) -> Result<EthicalEvaluation, ServiceError> {
        Ok(EthicalEvaluation {
            decision: EthicalDecision::Approve,
            reasoning: "no ethical concern".to_string(),
        })
    }
}

/// Common-sense stub scoring everything plausible.
pub struct PlausibleAll;

#[async_trait]
impl CommonSenseDma for PlausibleAll {
    async fn evaluate(
        &self,
        _thought: &Thought,
        _context: &DmaContext,
    ) -> Result<CommonSenseEvaluation, ServiceError> {
        Ok(CommonSenseEvaluation {
            plausibility_score: 0.95,
            flags: Vec::new(),
            reasoning: "plausible".to_string(),
        })
    }
}

/// Domain stub aligned with everything.
pub struct AlignedAll;

#[async_trait]
impl DomainDma for AlignedAll {
    async fn evaluate(
        &self,
        _thought: &Thought,
        _context: &DmaContext,
    ) -> Result<DomainEvaluation, ServiceError> {
        Ok(DomainEvaluation {
            domain: "general".to_string(),
            alignment_score: 0.9,
            notes: "aligned".to_string(),
        })
    }
}

/// Deterministic selection scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionScript {
    /// Seed thoughts speak; follow-ups complete the task.
    SpeakThenComplete,
    /// Every thought ponders; the depth guard must end the chain.
    PonderOnly,
}

/// Scripted selection DMA counting invocations.
pub struct ScriptedSelection {
    /// Script in effect.
    pub script: SelectionScript,
    /// Invocation counter.
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ActionSelectionDma for ScriptedSelection {
    async fn select(
        &self,
        context: &ActionSelectionContext,
    ) -> Result<SelectedAction, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let thought = &context.thought;
        let rationale = thought.content.clone();
        let action = match self.script {
            SelectionScript::SpeakThenComplete => {
                if thought.round_number == 0 {
                    let channel_id = thought
                        .context
                        .channel_id
                        .clone()
                        .unwrap_or_else(|| ChannelId::new("c1"));
                    ActionParams::Speak(SpeakParams {
                        channel_id,
                        content: "Hello! Happy to help.".to_string(),
                    })
                } else {
                    ActionParams::TaskComplete(TaskCompleteParams {
                        outcome: TaskOutcome::completed("replied to the user"),
                    })
                }
            }
            SelectionScript::PonderOnly => ActionParams::Ponder(PonderParams {
                questions: vec![thought.content.clone()],
            }),
        };
        Ok(SelectedAction::new(action, rationale))
    }
}

/// Faculty that always requests reconsideration.
pub struct AlwaysOverride;

#[async_trait]
impl ConscienceFaculty for AlwaysOverride {
    fn name(&self) -> &'static str {
        "always_override"
    }

    async fn review(
        &self,
        _thought: &Thought,
        _action: &SelectedAction,
    ) -> Result<FacultyReport, ServiceError> {
        Ok(FacultyReport {
            faculty: "always_override".to_string(),
            score: 1.0,
            reconsider: true,
            insight: "reconsider this selection".to_string(),
        })
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Harness options.
pub struct HarnessOptions {
    /// Selection script.
    pub script: SelectionScript,
    /// Depth cap for the pipeline.
    pub max_thought_depth: u32,
    /// Conscience faculties; empty means no overrides.
    pub faculties: Vec<Arc<dyn ConscienceFaculty>>,
    /// Whether a communication provider is registered.
    pub register_comm: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            script: SelectionScript::SpeakThenComplete,
            max_thought_depth: 7,
            faculties: Vec::new(),
            register_comm: true,
        }
    }
}

/// A fully wired deterministic runtime for scenario tests.
pub struct Harness {
    /// Manual clock driving every timestamp.
    pub clock: Arc<ManualClock>,
    /// Shared store implementing every persistence trait.
    pub store: Arc<SqliteStore>,
    /// Provider directory.
    pub registry: Arc<ServiceRegistry>,
    /// Audit chain under test.
    pub audit: Arc<AuditChain>,
    /// Processor under test.
    pub processor: Arc<CognitiveProcessor>,
    /// Handler context for direct dispatcher tests.
    pub ctx: Arc<HandlerContext>,
    /// Dispatcher for direct dispatcher tests.
    pub dispatcher: Arc<HandlerDispatcher>,
    /// Message ingress.
    pub ingress: Ingress,
    /// Recording communication provider.
    pub comm: Arc<RecordingComm>,
    /// Selection invocation counter.
    pub selection_calls: Arc<AtomicUsize>,
    /// Journal path for offline reads.
    journal_path: PathBuf,
    /// Temp dir keeping audit files alive.
    _dir: TempDir,
}

impl Harness {
    /// Advances the clock one second and processes one round.
    pub async fn step(&self) -> usize {
        self.clock.advance_millis(1_000);
        self.processor.single_step().await.unwrap()
    }

    /// Submits a plain user message on channel `c1`.
    pub fn submit(&self, content: &str) -> TaskId {
        self.ingress
            .submit_message(&IncomingMessage {
                author_id: "user-alice".to_string(),
                author_name: "alice".to_string(),
                channel_id: ChannelId::new("c1"),
                content: content.to_string(),
                timestamp: self.clock.now(),
                correlation_id: None,
            })
            .unwrap()
    }

    /// Reads every audit entry from the journal.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        Journal::open(&self.journal_path).unwrap().read_all().unwrap()
    }

    /// Returns the event types recorded so far.
    pub fn audit_event_types(&self) -> Vec<AuditEventType> {
        self.audit_entries().into_iter().map(|entry| entry.event_type).collect()
    }
}

/// Builds the harness.
pub fn build_harness(options: HarnessOptions) -> Harness {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(1_000_000)));
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let registry = Arc::new(ServiceRegistry::new(
        Arc::clone(&clock) as Arc<dyn Clock>,
        BreakerConfig::default(),
    ));

    let journal_path = dir.path().join("audit.jsonl");
    let signer =
        AuditSigner::generate(ciris_core::SigningKeyId::new("test-key"), SigningAlgorithm::Ed25519)
            .unwrap();
    let audit = Arc::new(
        AuditChain::open(
            &journal_path,
            &dir.path().join("audit.db"),
            signer,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap(),
    );

    let comm = Arc::new(RecordingComm::new());
    if options.register_comm {
        let caps: BTreeSet<String> =
            ["send_message", "fetch_messages"].into_iter().map(str::to_string).collect();
        registry
            .register(
                caps,
                Priority::High,
                ServiceProvider::Communication(Arc::clone(&comm) as _),
            )
            .unwrap();
    }
    registry
        .register(
            ["put_node", "get_node", "delete_node", "query_nodes", "put_edge"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            Priority::Normal,
            ServiceProvider::Memory(Arc::new(LocalGraphMemory::new(
                Arc::clone(&store) as Arc<dyn GraphStore>
            ))),
        )
        .unwrap();

    let bus_core = Arc::new(BusCore::new(
        Arc::clone(&registry),
        Some(Arc::clone(&store) as Arc<dyn CorrelationStore>),
        Arc::clone(&clock) as _,
    ));
    let buses = Arc::new(BusBundle::new(bus_core));

    let selection_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Arc::new(DmaPipeline::new(
        Arc::new(ApproveAll),
        Arc::new(PlausibleAll),
        Arc::new(AlignedAll),
        Arc::new(ScriptedSelection {
            script: options.script,
            calls: Arc::clone(&selection_calls),
        }),
        Conscience::new(options.faculties),
        PipelineConfig {
            max_thought_depth: options.max_thought_depth,
            dma_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        },
    ));

    let ctx = Arc::new(HandlerContext {
        buses,
        tasks: Arc::clone(&store) as _,
        thoughts: Arc::clone(&store) as _,
        scheduled: Arc::clone(&store) as _,
        audit: Arc::clone(&audit),
        clock: Arc::clone(&clock) as _,
        shutdown: ShutdownHandle::new(),
    });
    let dispatcher = Arc::new(HandlerDispatcher::with_default_handlers());

    let processor = Arc::new(CognitiveProcessor::new(
        pipeline,
        Arc::clone(&dispatcher),
        Arc::clone(&ctx),
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&registry),
        ProcessorSettings {
            max_active_thoughts: 50,
            round_delay: Duration::from_millis(10),
            shutdown_grace: Duration::from_secs(1),
            readiness_timeout: Duration::from_millis(10),
        },
    ));

    let ingress = Ingress::new(
        Arc::clone(&store) as _,
        Arc::clone(&audit),
        Arc::clone(&clock) as _,
    );

    Harness {
        clock,
        store,
        registry,
        audit,
        processor,
        ctx,
        dispatcher,
        ingress,
        comm,
        selection_calls,
        journal_path,
        _dir: dir,
    }
}
