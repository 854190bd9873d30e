// Shared actors and probes for the integration tests.

#![allow(dead_code)]

use actor::{
    Actor, ActorContext, ActorSystem, AllForOneStrategy, Behavior,
    BoxedMessage, Decider, Error, Handler, OneForOneStrategy, Props,
    SupervisorStrategy, SystemConfig, SystemRef, SystemRunner,
    default_decider,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const TIMEOUT: Duration = Duration::from_secs(3);
pub const SETTLE: Duration = Duration::from_millis(300);

pub fn system() -> (SystemRef, SystemRunner, CancellationToken) {
    let token = CancellationToken::new();
    let (system, runner) =
        ActorSystem::create(SystemConfig::new("test"), token.clone());
    (system, runner, token)
}

/// Receives the observations actors report.
pub struct Probe {
    receiver: mpsc::UnboundedReceiver<String>,
    pub seen: Vec<String>,
}

pub fn probe() -> (mpsc::UnboundedSender<String>, Probe) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        sender,
        Probe {
            receiver,
            seen: Vec::new(),
        },
    )
}

impl Probe {
    /// Waits until `event` is observed.
    pub async fn until(&mut self, event: &str) {
        loop {
            let next = tokio::time::timeout(TIMEOUT, self.receiver.recv())
                .await
                .unwrap_or_else(|_| {
                    panic!("timed out waiting for {}, seen {:?}", event, self.seen)
                })
                .expect("probe closed");
            self.seen.push(next.clone());
            if next == event {
                return;
            }
        }
    }

    /// Collects everything observed until nothing arrives for a while.
    pub async fn settle(&mut self) {
        while let Ok(Some(next)) =
            tokio::time::timeout(SETTLE, self.receiver.recv()).await
        {
            self.seen.push(next);
        }
    }

    pub fn count(&self, event: &str) -> usize {
        self.seen.iter().filter(|seen| *seen == event).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.seen.iter().filter(|seen| seen.starts_with(prefix)).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.seen.iter().position(|seen| seen == event)
    }
}

/// Does some work.
#[derive(Debug, Clone)]
pub struct Work(pub u32);

/// Fails with the given error.
#[derive(Debug, Clone)]
pub struct Fail(pub Error);

/// Stops the actor at the given path.
#[derive(Debug, Clone)]
pub struct StopPath(pub String);

/// Stops the actor at the given path through the system.
#[derive(Debug, Clone)]
pub struct SystemStop(pub String);

/// Suspends or resumes the actor at the given path.
#[derive(Debug, Clone)]
pub struct Suspend(pub String, pub bool);

/// Selects a path and reports what it resolved to.
#[derive(Debug, Clone)]
pub struct Select(pub String);

/// Construction arguments of [`Node`].
#[derive(Clone)]
pub struct NodeArgs {
    pub name: &'static str,
    pub probe: mpsc::UnboundedSender<String>,
    pub decider: Decider,
    pub all_for_one: bool,
    pub children: Vec<NodeArgs>,
    pub generation: Arc<AtomicUsize>,
}

impl NodeArgs {
    pub fn new(name: &'static str, probe: &mpsc::UnboundedSender<String>) -> Self {
        Self {
            name,
            probe: probe.clone(),
            decider: default_decider,
            all_for_one: false,
            children: Vec::new(),
            generation: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn deciding(mut self, decider: Decider) -> Self {
        self.decider = decider;
        self
    }

    pub fn all_for_one(mut self) -> Self {
        self.all_for_one = true;
        self
    }

    pub fn child(mut self, child: NodeArgs) -> Self {
        self.children.push(child);
        self
    }

    pub fn props(self) -> Props<Node> {
        Props::new(self)
    }
}

/// Actor reporting every lifecycle hook and message to a probe, as
/// `name:event:generation`. The generation counts the instances built for
/// the same context.
pub struct Node {
    args: NodeArgs,
    generation: usize,
}

impl Node {
    fn report(&self, event: &str) {
        let _ = self.args.probe.send(format!(
            "{}:{}:{}",
            self.args.name, event, self.generation
        ));
    }
}

#[async_trait]
impl Actor for Node {
    type Args = NodeArgs;

    fn create(args: &NodeArgs) -> Result<Self, Error> {
        let generation = args.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Node {
            args: args.clone(),
            generation,
        })
    }

    fn receive() -> Behavior<Self> {
        Behavior::new("node")
            .handle::<Work>()
            .handle::<Fail>()
            .handle::<StopPath>()
            .handle::<SystemStop>()
            .handle::<Suspend>()
            .handle::<Select>()
    }

    fn supervisor_strategy(&self) -> Box<dyn SupervisorStrategy> {
        if self.args.all_for_one {
            Box::new(AllForOneStrategy::new(self.args.decider))
        } else {
            Box::new(OneForOneStrategy::new(self.args.decider))
        }
    }

    async fn pre_start(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        for child in &self.args.children {
            ctx.actor_of_named(Props::<Node>::new(child.clone()), child.name)
                .await?;
        }
        self.report("pre_start");
        Ok(())
    }

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        self.report("post_stop");
        Ok(())
    }

    async fn pre_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _reason: &Error,
        message: Option<BoxedMessage>,
    ) -> Result<(), Error> {
        match message {
            Some(message) => {
                self.report(&format!("pre_restart({:?})", message))
            }
            None => self.report("pre_restart"),
        }
        ctx.stop_children().await;
        self.post_stop(ctx).await
    }

    async fn post_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _reason: &Error,
    ) -> Result<(), Error> {
        self.report("post_restart");
        self.pre_start(ctx).await
    }
}

#[async_trait]
impl Handler<Work> for Node {
    async fn handle(
        &mut self,
        msg: Work,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        self.report(&format!("work({})", msg.0));
        Ok(())
    }
}

#[async_trait]
impl Handler<Fail> for Node {
    async fn handle(
        &mut self,
        msg: Fail,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Err(msg.0)
    }
}

#[async_trait]
impl Handler<StopPath> for Node {
    async fn handle(
        &mut self,
        msg: StopPath,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        if let Some(target) = ctx.actor_selection(&msg.0).await.reference() {
            ctx.stop(&target).await;
        }
        self.report(&format!("stopped({})", msg.0));
        Ok(())
    }
}

#[async_trait]
impl Handler<SystemStop> for Node {
    async fn handle(
        &mut self,
        msg: SystemStop,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        if let Some(target) = ctx.actor_selection(&msg.0).await.reference() {
            ctx.system().stop(&target).await;
        }
        self.report(&format!("system_stopped({})", msg.0));
        Ok(())
    }
}

#[async_trait]
impl Handler<Suspend> for Node {
    async fn handle(
        &mut self,
        msg: Suspend,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        let Some(target) = ctx.actor_selection(&msg.0).await.reference() else {
            return Ok(());
        };
        let result = if msg.1 {
            ctx.suspend(&target).await
        } else {
            ctx.resume(&target).await
        };
        match result {
            Ok(()) => self.report(&format!("suspend({},{})", msg.0, msg.1)),
            Err(Error::NotChild(..)) => {
                self.report(&format!("not_child({})", msg.0))
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }
}

#[async_trait]
impl Handler<Select> for Node {
    async fn handle(
        &mut self,
        msg: Select,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        let resolved = ctx
            .actor_selection(&msg.0)
            .await
            .reference()
            .map(|target| target.path().to_string())
            .unwrap_or_default();
        self.report(&format!("select({})={}", msg.0, resolved));
        Ok(())
    }
}
