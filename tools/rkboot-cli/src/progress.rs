//! indicatif-backed progress bars, one per partition pass.

use indicatif::{ProgressBar, ProgressStyle};
use rkboot_device::Progress;

pub struct Bars {
    current: Option<ProgressBar>,
}

impl Bars {
    pub fn new() -> Bars {
        Bars { current: None }
    }
}

impl Progress for Bars {
    fn begin(&mut self, label: &str, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {percent:>3}%")
                .expect("static progress template")
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        self.current = Some(bar);
    }

    fn advance(&mut self, position: u64) {
        if let Some(bar) = &self.current {
            bar.set_position(position);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.current.take() {
            bar.finish();
        }
    }
}
