use checkloop_common::WorkflowEvent;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui::icons::{CHECK, CROSS, MAKER, REVIEW, SPARKLE, STOP};
use crate::workflow::EventSink;

/// One-line, uncoloured summary of an event.
pub fn describe(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::IterationStart { iteration } => format!("Iteration {} started", iteration),
        WorkflowEvent::MakerComplete {
            iteration,
            output_artifact_url,
            thumbnail_urls,
            ..
        } => {
            if thumbnail_urls.is_empty() {
                format!("Iteration {} output: {}", iteration, output_artifact_url)
            } else {
                format!(
                    "Iteration {} output: {} ({} preview pages)",
                    iteration,
                    output_artifact_url,
                    thumbnail_urls.len()
                )
            }
        }
        WorkflowEvent::CheckerComplete {
            iteration,
            passed,
            confidence,
            ..
        } => format!(
            "Iteration {} {} at {:.0}% confidence",
            iteration,
            if *passed { "passed" } else { "failed" },
            confidence * 100.0
        ),
        WorkflowEvent::WorkflowComplete {
            success,
            total_iterations,
            final_artifact_url,
            ..
        } => {
            let verdict = if *success { "succeeded" } else { "ended without a pass" };
            match final_artifact_url {
                Some(url) => format!(
                    "Run {} after {} iteration(s): {}",
                    verdict, total_iterations, url
                ),
                None => format!("Run {} after {} iteration(s)", verdict, total_iterations),
            }
        }
        WorkflowEvent::Error { message, iteration } => {
            format!("Run failed in iteration {}: {}", iteration, message)
        }
    }
}

/// Terminal UI for a single run, rendered via `indicatif`.
///
/// A bar tracks reviewed iterations against the budget and a spinner shows
/// which side of the loop is working.
pub struct RunUI {
    multi: MultiProgress,
    iteration_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl RunUI {
    pub fn new(max_iterations: u32, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let bar_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");
        let iteration_bar = multi.add(ProgressBar::new(u64::from(max_iterations)));
        iteration_bar.set_style(bar_style);
        iteration_bar.set_prefix("Rounds");

        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(spinner_style);
        step_bar.set_prefix("  Step");

        Self {
            multi,
            iteration_bar,
            step_bar,
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn stop_requested(&self) {
        self.print_line(format!(
            "{}{}",
            STOP,
            style("Stop requested; finishing the current step").yellow()
        ));
    }

    fn render(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::IterationStart { iteration } => {
                self.step_bar.enable_steady_tick(Duration::from_millis(100));
                self.step_bar.set_message(format!(
                    "iteration {} {}",
                    style(iteration).cyan(),
                    style("(generating)").dim()
                ));
            }
            WorkflowEvent::MakerComplete { iteration, .. } => {
                self.print_line(format!("{}{}", MAKER, describe(event)));
                self.step_bar.set_message(format!(
                    "iteration {} {}",
                    style(iteration).cyan(),
                    style("(reviewing)").dim()
                ));
            }
            WorkflowEvent::CheckerComplete {
                passed,
                feedback,
                issues,
                ..
            } => {
                let icon = if *passed { CHECK } else { CROSS };
                self.print_line(format!("{}{}", icon, describe(event)));
                if self.verbose {
                    self.print_line(format!("    {} {}", REVIEW, style(feedback).dim()));
                    for issue in issues {
                        self.print_line(format!("    {} {}", style("-").dim(), issue));
                    }
                }
                self.iteration_bar.inc(1);
            }
            WorkflowEvent::WorkflowComplete { success, .. } => {
                self.step_bar.finish_and_clear();
                let line = if *success {
                    format!("{}{}", SPARKLE, style(describe(event)).green().bold())
                } else {
                    format!("{}", style(describe(event)).yellow())
                };
                self.iteration_bar.finish_with_message(line);
            }
            WorkflowEvent::Error { .. } => {
                self.step_bar.finish_and_clear();
                self.iteration_bar
                    .abandon_with_message(format!("{}{}", CROSS, style(describe(event)).red()));
            }
        }
    }
}

impl EventSink for RunUI {
    fn emit(&self, event: WorkflowEvent) {
        self.render(&event);
    }
}

/// Writes each event as one JSON object per line on stdout.
#[derive(Debug, Default)]
pub struct JsonLinesSink;

impl EventSink for JsonLinesSink {
    fn emit(&self, event: WorkflowEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to serialize event: {}", e),
        }
    }
}
