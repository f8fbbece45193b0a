//! Interface de terminal do trajwiz: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso do treino e `console`
//! para estilização com cores. O [`WorkflowProgress`] recebe as atualizações
//! do canal de progresso através de [`ProgressObserver`].

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::backend::{GenerationResult, MapMatchResponse, ModelStats};
use crate::progress::ProgressObserver;
use crate::workflow::{Notification, NotificationKind, WorkflowStep};

/// Indicador visual do assistente no terminal.
///
/// A barra vai de 0 a 100 e mostra a última mensagem do servidor;
/// notificações aparecem em verde (sucesso) ou vermelho (erro).
pub struct WorkflowProgress {
    // Barra do indicatif; só é desenhada a partir do primeiro progresso.
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
    bold: Style,
}

impl Default for WorkflowProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowProgress {
    pub fn new() -> Self {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }

    /// Cabeçalho de uma etapa do assistente.
    pub fn step(&self, step: WorkflowStep) {
        println!(
            "{} {}",
            self.dim.apply_to(format!("[{}/3]", step.number())),
            self.bold.apply_to(step)
        );
    }

    /// Exibe uma notificação com o estilo do seu tipo.
    pub fn notify(&self, notification: &Notification) {
        let line = match notification.kind {
            NotificationKind::Success => {
                format!("  {} {}", self.green.apply_to("✓"), notification.message)
            }
            NotificationKind::Error => {
                format!("  {} {}", self.red.apply_to("✗"), notification.message)
            }
        };
        self.pb.suspend(|| println!("{line}"));
    }

    pub fn print_stats(&self, stats: &ModelStats) {
        println!("  {}", self.bold.apply_to("Model statistics"));
        println!("    cells created    {}", stats.cells_created);
        println!("    unique bigrams   {}", stats.unique_bigrams);
        println!("    unique trigrams  {}", stats.unique_trigrams);
        for (key, value) in &stats.extra {
            println!("    {key:<16} {value}");
        }
    }

    pub fn print_generation(&self, result: &GenerationResult) {
        match &result.generated_file {
            Some(file) => println!("  generated file: {}", self.bold.apply_to(file)),
            None => println!("  {}", self.dim.apply_to("no file was generated")),
        }
        println!(
            "  {}",
            self.dim.apply_to(format!(
                "visualization: {} bytes, heatmap: {} bytes",
                result.visualization.to_string().len(),
                result.heatmap.to_string().len()
            ))
        );
    }

    pub fn print_map_match(&self, response: &MapMatchResponse) {
        println!(
            "  {} map-matched trajectories written to {}",
            self.green.apply_to("✓"),
            self.bold.apply_to(&response.output_file)
        );
    }

    pub fn print_download(&self, path: &std::path::Path, bytes: u64) {
        println!(
            "  {} {} ({bytes} bytes)",
            self.green.apply_to("✓"),
            path.display()
        );
    }
}

impl ProgressObserver for WorkflowProgress {
    fn on_progress(&self, value: u8, message: &str) {
        self.pb.set_position(u64::from(value));
        self.pb.set_message(message.to_string());
    }

    fn on_closed(&self) {
        self.pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_tracks_raw_values() {
        let ui = WorkflowProgress::new();
        ui.pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        ui.on_progress(40, "building bigrams");
        assert_eq!(ui.pb.position(), 40);
        ui.on_progress(30, "building trigrams");
        assert_eq!(ui.pb.position(), 30);
        assert_eq!(ui.pb.message(), "building trigrams");
        ui.on_closed();
        assert!(ui.pb.is_finished());
    }
}
