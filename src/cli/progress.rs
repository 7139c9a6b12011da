use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::output::{Formatter, MARKDOWN_PROGRESS_HEADER, get_formatter};
use crate::models::{OutputFormat, ProgressRecord};
use crate::services::ProgressReporter;

/// Prints one line per batch on stdout, with a spinner on stderr when attached to a terminal.
pub struct ConsoleReporter {
    formatter: Box<dyn Formatter>,
    bar: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new(format: OutputFormat, show_bar: bool) -> Self {
        let bar = (show_bar && format == OutputFormat::Text && std::io::stderr().is_terminal())
            .then(|| {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {pos} images stored {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            });

        if format == OutputFormat::Markdown {
            println!("{}", MARKDOWN_PROGRESS_HEADER);
        }

        Self {
            formatter: get_formatter(format),
            bar,
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&self, record: &ProgressRecord) {
        let line = self.formatter.format_progress(record);
        match &self.bar {
            Some(pb) => {
                pb.suspend(|| println!("{}", line));
                pb.inc(record.success_count);
                pb.set_message(format!("(batch {})", record.batch_index));
            }
            None => println!("{}", line),
        }
    }
}
