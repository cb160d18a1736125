//! Completion signals.
//!
//! 投入（submit）は常にハンドルを返し、待つか捨てるかは呼び出し側が決めます。
//! - `wait().await`: スクリプトスレッドから同期的な意味論を得たいとき
//! - `detach()`: fire-and-forget

use tokio::sync::oneshot;

use crate::domain::TaskOutcome;

pub(crate) type Reply = oneshot::Sender<TaskOutcome>;

/// Resolves once the submitted job's chosen branch has finished.
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited; call `detach()` to drop it explicitly"]
pub struct Completion {
    rx: oneshot::Receiver<TaskOutcome>,
}

impl Completion {
    pub(crate) fn channel() -> (Reply, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// An already-resolved completion.
    pub(crate) fn ready(outcome: TaskOutcome) -> Self {
        let (tx, completion) = Self::channel();
        // the receiver is alive in `completion`
        let _ = tx.send(outcome);
        completion
    }

    pub async fn wait(self) -> TaskOutcome {
        self.rx.await.unwrap_or(TaskOutcome::Abandoned)
    }

    /// Non-blocking poll: `None` while the job is still pending.
    pub fn try_outcome(&mut self) -> Option<TaskOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(TaskOutcome::Abandoned),
        }
    }

    /// Fire-and-forget.
    pub fn detach(self) {}
}

/// A group of completions that resolves when every member has.
#[derive(Debug, Default)]
#[must_use = "a completion set does nothing unless awaited"]
pub struct CompletionSet {
    members: Vec<Completion>,
}

impl CompletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, completion: Completion) {
        self.members.push(completion);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Outcomes in submission order.
    pub async fn wait_all(self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(self.members.len());
        for member in self.members {
            outcomes.push(member.wait().await);
        }
        outcomes
    }

    pub fn detach(self) {}
}

impl FromIterator<Completion> for CompletionSet {
    fn from_iter<I: IntoIterator<Item = Completion>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CompletionSet {
    type Item = Completion;
    type IntoIter = std::vec::IntoIter<Completion>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}

impl Extend<Completion> for CompletionSet {
    fn extend<I: IntoIterator<Item = Completion>>(&mut self, iter: I) {
        self.members.extend(iter);
    }
}
