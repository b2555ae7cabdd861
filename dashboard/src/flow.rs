//! Transaction flow engine
//!
//! Drives a [`TransactionFlow`] to a terminal state by executing the
//! effects returned from `vault_model::transition` against the chain
//! client. The flow itself is published through a watch channel; every
//! state change is also reported to an optional transition hook so that
//! transient states such as APPROVED are observable.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vault_model::{transition, Effect, FlowEvent, FlowKind, FlowState, TransactionFlow, TxStep};

use crate::chain::{ChainClient, WriteCall};
use crate::read_cache::ReadCache;

/// Called once when a flow reaches SUCCESS
pub type SuccessHook = Arc<dyn Fn() + Send + Sync>;

/// Called with the new flow after every state change
pub type TransitionHook = Arc<dyn Fn(&TransactionFlow) + Send + Sync>;

/// Contracts and account a flow operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTarget {
    pub usdc: Address,
    pub vault: Address,
    /// Signer, deposit receiver and withdrawal owner/receiver
    pub account: Address,
}

impl FlowTarget {
    pub fn call(&self, step: TxStep, amount: U256) -> WriteCall {
        match step {
            TxStep::Approve => WriteCall::Approve {
                token: self.usdc,
                spender: self.vault,
                amount,
            },
            TxStep::Deposit => WriteCall::Deposit {
                vault: self.vault,
                assets: amount,
                receiver: self.account,
            },
            TxStep::Withdraw => WriteCall::Withdraw {
                vault: self.vault,
                assets: amount,
                receiver: self.account,
                owner: self.account,
            },
        }
    }
}

pub struct FlowEngine<C: ChainClient> {
    chain: Arc<C>,
    target: FlowTarget,
    flow: Arc<watch::Sender<TransactionFlow>>,
    on_success: Option<SuccessHook>,
    on_transition: Option<TransitionHook>,
    cache: Option<Arc<ReadCache>>,
}

impl<C: ChainClient> Clone for FlowEngine<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            target: self.target,
            flow: self.flow.clone(),
            on_success: self.on_success.clone(),
            on_transition: self.on_transition.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<C: ChainClient> FlowEngine<C> {
    pub fn new(chain: Arc<C>, target: FlowTarget, kind: FlowKind) -> Self {
        let (flow, _) = watch::channel(TransactionFlow::new(kind));
        Self {
            chain,
            target,
            flow: Arc::new(flow),
            on_success: None,
            on_transition: None,
            cache: None,
        }
    }

    pub fn with_success_hook(mut self, hook: SuccessHook) -> Self {
        self.on_success = Some(hook);
        self
    }

    pub fn with_transition_hook(mut self, hook: TransitionHook) -> Self {
        self.on_transition = Some(hook);
        self
    }

    /// Cache to invalidate once a flow succeeds
    pub fn with_cache(mut self, cache: Arc<ReadCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn kind(&self) -> FlowKind {
        self.flow.borrow().kind
    }

    pub fn target(&self) -> &FlowTarget {
        &self.target
    }

    pub fn snapshot(&self) -> TransactionFlow {
        self.flow.borrow().clone()
    }

    pub fn state(&self) -> FlowState {
        self.flow.borrow().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.flow.borrow().last_error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionFlow> {
        self.flow.subscribe()
    }

    /// Apply one event and return the effect the caller must execute
    pub fn apply(&self, event: FlowEvent) -> Effect {
        let mut effect = Effect::None;
        let mut changed = None;
        self.flow.send_if_modified(|flow| {
            let (next, e) = transition(flow.clone(), event);
            effect = e;
            if next == *flow {
                return false;
            }
            if next.state != flow.state {
                log::info!(
                    "{:?} flow {} -> {}",
                    next.kind,
                    flow.state.label(),
                    next.state.label()
                );
            }
            *flow = next;
            changed = Some(flow.clone());
            true
        });
        // Outside the channel lock so hooks may read the engine
        if let (Some(hook), Some(flow)) = (&self.on_transition, &changed) {
            hook(flow);
        }
        effect
    }

    /// Start a flow for `amount` and drive it in the background.
    ///
    /// Returns `None` when the start was ignored (zero amount, or a flow
    /// that is in flight or awaiting reset).
    pub fn start(&self, amount: U256) -> Option<JoinHandle<()>> {
        let effect = self.apply(FlowEvent::Start(amount));
        if effect == Effect::None {
            return None;
        }
        let engine = self.clone();
        Some(tokio::spawn(async move { engine.drive(effect).await }))
    }

    /// Start a flow and drive it to a terminal state on the current task
    pub async fn run(&self, amount: U256) -> TransactionFlow {
        let effect = self.apply(FlowEvent::Start(amount));
        self.drive(effect).await;
        self.snapshot()
    }

    /// Return a terminal flow to IDLE. In-flight flows are left untouched.
    pub fn reset(&self) -> bool {
        if self.snapshot().is_in_flight() {
            return false;
        }
        self.apply(FlowEvent::Reset);
        true
    }

    async fn drive(&self, mut effect: Effect) {
        loop {
            effect = match effect {
                Effect::None => return,
                Effect::Submit { step, amount } => self.execute(step, amount).await,
                Effect::Complete => {
                    self.complete();
                    return;
                }
            };
        }
    }

    async fn execute(&self, step: TxStep, amount: U256) -> Effect {
        self.apply(FlowEvent::Sending(step));

        let call = self.target.call(step, amount);
        log::info!("Submitting {} of {} to {}", step.selector(), amount, call.target());

        let tx_hash = match self.chain.write_contract(call).await {
            Ok(hash) => hash,
            Err(e) => {
                log::error!("{} submission failed: {}", step.selector(), e);
                return self.apply(FlowEvent::Failed(e.to_string()));
            }
        };
        self.apply(FlowEvent::Submitted(step, tx_hash));

        match self.chain.wait_for_confirmation(tx_hash).await {
            Ok(receipt) => {
                log::info!(
                    "{} {} confirmed in block {}",
                    step.selector(),
                    receipt.tx_hash,
                    receipt.block_number
                );
                self.apply(FlowEvent::Confirmed(step))
            }
            Err(e) => {
                log::error!("{} {} failed: {}", step.selector(), tx_hash, e);
                self.apply(FlowEvent::Failed(e.to_string()))
            }
        }
    }

    fn complete(&self) {
        if let Some(hook) = &self.on_success {
            hook();
        }
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}
