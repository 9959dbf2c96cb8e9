use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One bar for dispatch, then a spinner while waiting for convergence.
pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { current: None }),
        }
    }

    pub(crate) fn dispatch(&self, batch: u64, batches: u64, message: String) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pb = inner.get_or_create(Phase::Dispatch, Some(batches));
        pb.set_message(message);
        pb.set_position(batch.min(batches));
    }

    pub(crate) fn converge(&self, message: String) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pb = inner.get_or_create(Phase::Converge, None);
        pb.set_message(message);
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((_, pb)) = inner.current.take() {
            pb.finish_and_clear();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Dispatch,
    Converge,
}

struct Inner {
    current: Option<(Phase, ProgressBar)>,
}

impl Inner {
    fn get_or_create(&mut self, phase: Phase, len: Option<u64>) -> &ProgressBar {
        let needs_recreate = self.current.as_ref().is_some_and(|(p, _)| *p != phase);
        if needs_recreate && let Some((_, old)) = self.current.take() {
            old.finish_and_clear();
        }

        let (_, pb) = self.current.get_or_insert_with(|| {
            let pb = match len {
                Some(len) => {
                    let pb = ProgressBar::with_draw_target(
                        Some(len),
                        ProgressDrawTarget::stderr_with_hz(5),
                    );
                    pb.set_style(bar_style());
                    pb.set_prefix("dispatch");
                    pb
                }
                None => {
                    let pb = ProgressBar::with_draw_target(
                        None,
                        ProgressDrawTarget::stderr_with_hz(5),
                    );
                    pb.set_style(spinner_style());
                    pb.set_prefix("converge");
                    pb.enable_steady_tick(Duration::from_millis(120));
                    pb
                }
            };
            (phase, pb)
        });

        pb
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
