use gedung_core::{ClassificationResult, Label, RunEvent, RunOutput, RunProgressCallback, RunState};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Message types for communication between a running batch and the TUI
#[derive(Debug)]
pub enum RunMessage {
    /// Progress event forwarded from the orchestrator
    Event(RunEvent),
    /// Run completed with its report and archive
    Finished(Box<RunOutput>),
    /// Run aborted before producing output
    Failed(String),
}

#[derive(Debug)]
pub enum RunOutcome {
    Finished(Box<RunOutput>),
    Failed(String),
}

/// Build a progress callback that forwards every event down `tx`.
pub fn progress_callback(tx: mpsc::UnboundedSender<RunMessage>) -> RunProgressCallback {
    Arc::new(move |event: RunEvent| {
        // Receiver gone means the app quit; nothing left to tell.
        let _ = tx.send(RunMessage::Event(event));
    })
}

/// Tracks one run from the app side of the channel.
pub struct RunMonitor {
    rx: mpsc::UnboundedReceiver<RunMessage>,
    state: RunState,
    total: usize,
    completed: usize,
    status: String,
    lines: Vec<String>,
    outcome: Option<RunOutcome>,
}

impl RunMonitor {
    pub fn new(rx: mpsc::UnboundedReceiver<RunMessage>, total: usize) -> Self {
        Self {
            rx,
            state: RunState::Idle,
            total,
            completed: 0,
            status: "Loading model...".to_string(),
            lines: Vec::new(),
            outcome: None,
        }
    }

    /// Drain everything the run has sent so far without blocking
    pub fn process_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                RunMessage::Event(RunEvent::State(state)) => {
                    self.state = state;
                    self.status = match state {
                        RunState::Idle => "Waiting...".to_string(),
                        RunState::Resetting => "Preparing output area...".to_string(),
                        RunState::Processing => self.status.clone(),
                        RunState::Reporting => "Writing report...".to_string(),
                        RunState::Packaging => "Packaging results...".to_string(),
                        RunState::Done => "Done".to_string(),
                    };
                }
                RunMessage::Event(RunEvent::RowStarted { status, .. }) => {
                    self.status = status;
                }
                RunMessage::Event(RunEvent::RowFinished {
                    index,
                    total,
                    result,
                }) => {
                    self.completed = index + 1;
                    self.total = total;
                    self.lines.push(row_line(index, total, &result));
                }
                RunMessage::Finished(output) => {
                    self.outcome = Some(RunOutcome::Finished(output));
                }
                RunMessage::Failed(error) => {
                    self.outcome = Some(RunOutcome::Failed(error));
                }
            }
        }
    }

    pub fn drain_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    pub fn take_outcome(&mut self) -> Option<RunOutcome> {
        self.outcome.take()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Fraction of rows done, 0.0 to 1.0. An empty batch counts as done.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return if self.state == RunState::Done { 1.0 } else { 0.0 };
        }
        (self.completed as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    pub fn render(&self, f: &mut Frame, area: Rect) {
        let (title, border_color) = if self.state == RunState::Done {
            (" Complete ", Color::Green)
        } else {
            (" Progress ", Color::Yellow)
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(border_color));
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(inner);

        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
            .ratio(self.ratio())
            .label(format!("{}/{}", self.completed, self.total));
        f.render_widget(gauge, rows[0]);

        let status = Paragraph::new(Line::from(vec![
            Span::styled("⠋ ", Style::default().fg(Color::Cyan)),
            Span::styled(
                self.status.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]));
        f.render_widget(status, rows[1]);
    }
}

fn row_line(index: usize, total: usize, result: &ClassificationResult) -> String {
    let icon = match result.label {
        Label::Building => "✓",
        Label::NotBuilding => "·",
        Label::ErrorDownload { .. } | Label::ErrorOther(_) => "✗",
    };
    let detail = match &result.label {
        Label::ErrorDownload { status } => format!("{} ({})", result.label, status),
        label => label.to_string(),
    };
    format!("  {} [{}/{}] {}  {}", icon, index + 1, total, detail, result.url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gedung_core::RunSummary;
    use std::path::PathBuf;

    fn result(label: Label) -> ClassificationResult {
        ClassificationResult {
            url: "https://dl.test/?file=1.jpg".to_string(),
            label,
        }
    }

    #[test]
    fn test_progress_follows_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut monitor = RunMonitor::new(rx, 2);
        let callback = progress_callback(tx);

        callback(RunEvent::State(RunState::Resetting));
        callback(RunEvent::State(RunState::Processing));
        callback(RunEvent::RowStarted {
            index: 0,
            total: 2,
            status: "Processing row 1/2...".to_string(),
        });
        callback(RunEvent::RowFinished {
            index: 0,
            total: 2,
            result: result(Label::Building),
        });
        monitor.process_messages();

        assert_eq!(monitor.state(), RunState::Processing);
        assert_eq!(monitor.status(), "Processing row 1/2...");
        assert_eq!(monitor.completed(), 1);
        assert_eq!(monitor.ratio(), 0.5);

        let lines = monitor.drain_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[1/2] Building"));
        assert!(monitor.drain_lines().is_empty());
    }

    #[test]
    fn test_download_error_line_shows_status() {
        let line = row_line(2, 5, &result(Label::ErrorDownload { status: 404 }));
        assert!(line.contains("✗ [3/5] Error Download (404)"));
    }

    #[test]
    fn test_finished_outcome() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut monitor = RunMonitor::new(rx, 0);
        let now = Utc::now();

        tx.send(RunMessage::Event(RunEvent::State(RunState::Done)))
            .unwrap();
        tx.send(RunMessage::Finished(Box::new(RunOutput {
            results: vec![],
            summary: RunSummary::from_results(&[], now, now),
            report_path: PathBuf::from("temp_process/Laporan_Klasifikasi.xlsx"),
            archive: vec![1, 2, 3],
        })))
        .unwrap();
        monitor.process_messages();

        assert_eq!(monitor.ratio(), 1.0);
        match monitor.take_outcome() {
            Some(RunOutcome::Finished(output)) => assert_eq!(output.archive, vec![1, 2, 3]),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(monitor.take_outcome().is_none());
    }

    #[test]
    fn test_failed_outcome() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut monitor = RunMonitor::new(rx, 3);

        tx.send(RunMessage::Failed("Model 'best.onnx' not found".to_string()))
            .unwrap();
        monitor.process_messages();

        assert!(matches!(
            monitor.take_outcome(),
            Some(RunOutcome::Failed(msg)) if msg.contains("not found")
        ));
    }
}
