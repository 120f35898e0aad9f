use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "{msg} {percent}% [{pos} / {len} bytes] {wide_bar:.cyan/blue} ({bytes_per_sec}, {eta})";

const SPINNER_TEMPLATE: &str = "{spinner:.blue} {msg} [{pos} bytes] ({bytes_per_sec})";

const PB_CHARS: &str = "█▓▒░  ";

/// Console progress for a single download, fed by the fetcher's
/// `(bytes_so_far, total)` callback.
pub struct ProgressReporter {
    pb: ProgressBar,
    sized: bool,
}

impl ProgressReporter {
    pub fn new() -> Self {
        // Progress shares stdout with the status lines.
        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
            pb.set_style(style);
        }
        pb.set_message("Downloading:");
        ProgressReporter { pb, sized: false }
    }

    /// Switches to a bar the first time a total is known.
    pub fn update(&mut self, done: u64, total: Option<u64>) {
        if let (Some(total), false) = (total, self.sized) {
            self.pb.set_length(total);
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                self.pb.set_style(style.progress_chars(PB_CHARS));
            }
            self.sized = true;
        }
        self.pb.set_position(done);
    }

    pub fn finish(self) {
        self.pb.finish_and_clear();
    }

    pub fn abandon(self) {
        self.pb.abandon();
    }
}
