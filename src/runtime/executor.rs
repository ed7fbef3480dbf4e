//! Conversation actor and its public handle

use super::supervisor::TaskSupervisor;
use super::traits::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::context::{ContextProvider, NoContext};
use crate::llm::LlmGateway;
use crate::prompt::{inject_context, DEFAULT_SYSTEM_PROMPT};
use crate::state_machine::{transition, Action, ConvContext, Effect, Outcome, State};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Mailbox message for the actor
#[derive(Debug)]
enum Command {
    Dispatch(Action),
    SetTools(ToolRegistry),
}

/// Cheap cloneable sender into a conversation's mailbox.
///
/// Sending never blocks. After the conversation has stopped, dispatch is a
/// silent no-op.
#[derive(Clone)]
pub struct Dispatcher {
    mailbox: mpsc::UnboundedSender<Command>,
}

impl Dispatcher {
    pub fn dispatch(&self, action: Action) {
        if self.mailbox.send(Command::Dispatch(action)).is_err() {
            tracing::debug!("Dispatch after conversation stopped; dropping action");
        }
    }
}

/// Builder for [`Conversation`]
pub struct ConversationBuilder {
    gateway: Arc<dyn LlmGateway>,
    tools: ToolRegistry,
    system_prompt: String,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    context: Arc<dyn ContextProvider>,
}

impl ConversationBuilder {
    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Source of ambient context, read before every LLM request
    #[must_use]
    pub fn context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    /// Spawn the actor on the current tokio runtime
    pub fn start(self) -> Conversation {
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let initial = State::initial(self.clock.now());
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let dispatcher = Dispatcher {
            mailbox: mailbox_tx,
        };

        let actor = Actor {
            state: initial,
            system_prompt: self.system_prompt,
            clock: self.clock,
            ids: self.ids,
            context: self.context,
            gateway: self.gateway,
            tools: Arc::new(self.tools),
            supervisor: TaskSupervisor::new(tracker.clone(), dispatcher.clone()),
            mailbox: mailbox_rx,
            state_tx,
            shutdown: shutdown.clone(),
        };
        tracker.spawn(actor.run());

        Conversation {
            dispatcher,
            state_rx,
            shutdown,
            tracker,
        }
    }
}

/// Handle to one running conversation.
///
/// Dropping the handle tears the conversation down; use
/// [`Conversation::shutdown`] to also wait for in-flight tasks to finish.
pub struct Conversation {
    dispatcher: Dispatcher,
    state_rx: watch::Receiver<State>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Conversation {
    pub fn builder(gateway: Arc<dyn LlmGateway>) -> ConversationBuilder {
        ConversationBuilder {
            gateway,
            tools: ToolRegistry::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            clock: Arc::new(SystemClock::default()),
            ids: Arc::new(UuidGenerator),
            context: Arc::new(NoContext),
        }
    }

    /// Start with production clock and ids
    pub fn start(
        gateway: Arc<dyn LlmGateway>,
        tools: ToolRegistry,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self::builder(gateway)
            .tools(tools)
            .system_prompt(system_prompt)
            .start()
    }

    /// Enqueue an action. Fire-and-forget.
    pub fn dispatch(&self, action: Action) {
        if self.shutdown.is_cancelled() {
            tracing::debug!(action = action.kind(), "Dispatch after shutdown ignored");
            return;
        }
        self.dispatcher.dispatch(action);
    }

    /// Snapshot of the latest state
    pub fn state(&self) -> State {
        self.state_rx.borrow().clone()
    }

    /// Receiver that observes every applied transition
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state_rx.clone()
    }

    /// Replace the tool registry. Takes effect for tool calls forked after
    /// the swap is processed.
    pub fn set_tools(&self, tools: ToolRegistry) {
        if self.dispatcher.mailbox.send(Command::SetTools(tools)).is_err() {
            tracing::debug!("Tool registry swap after conversation stopped");
        }
    }

    /// Stop the actor, interrupt outstanding tasks and wait for all of them
    /// to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.tracker.close();
    }
}

/// Owns the state; applies one action at a time
struct Actor {
    state: State,
    system_prompt: String,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    context: Arc<dyn ContextProvider>,
    gateway: Arc<dyn LlmGateway>,
    tools: Arc<ToolRegistry>,
    supervisor: TaskSupervisor,
    mailbox: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<State>,
    shutdown: CancellationToken,
}

impl Actor {
    async fn run(mut self) {
        tracing::info!(tools = self.tools.len(), "Starting conversation runtime");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                command = self.mailbox.recv() => match command {
                    Some(Command::Dispatch(action)) => self.process(action),
                    Some(Command::SetTools(tools)) => {
                        tracing::info!(tools = tools.len(), "Tool registry replaced");
                        self.tools = Arc::new(tools);
                    }
                    None => break,
                },
            }
        }

        self.supervisor.interrupt_all();
        self.mailbox.close();
        tracing::info!(state = self.state.kind(), "Conversation runtime stopped");
    }

    fn process(&mut self, action: Action) {
        let kind = action.kind();
        let from = self.state.kind();

        let placeholder = State::initial(self.state.timestamp());
        let state = std::mem::replace(&mut self.state, placeholder);
        let ctx = ConvContext::new(&self.system_prompt, self.clock.as_ref(), self.ids.as_ref());
        let result = transition(state, &ctx, action);

        match result.outcome {
            Outcome::Applied => {
                tracing::debug!(action = kind, from, to = result.new_state.kind(), "Action applied");
            }
            Outcome::Ignored(reason) => {
                tracing::debug!(action = kind, state = from, reason, "Action ignored");
            }
        }
        let applied = result.outcome == Outcome::Applied;
        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect);
        }
        self.supervisor.retain(&self.state.outstanding_tasks());

        if applied {
            self.state_tx.send_replace(self.state.clone());
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RequestLlm { task, prompt } => {
                let context = self.context.context();
                if !context.is_empty() {
                    tracing::debug!(messages = context.messages.len(), "Injecting conversation context");
                }
                let mut prompt = inject_context(prompt, &context);
                prompt.tool_config = self.tools.tool_config();
                self.supervisor
                    .spawn_llm(task, prompt, Arc::clone(&self.gateway));
            }
            Effect::ExecuteTool { task, request } => {
                self.supervisor
                    .spawn_tool(task, request, Arc::clone(&self.tools));
            }
            Effect::Interrupt { tasks } => {
                tracing::info!(count = tasks.len(), "Interrupting outstanding tasks");
                self.supervisor.interrupt(&tasks);
            }
        }
    }
}
