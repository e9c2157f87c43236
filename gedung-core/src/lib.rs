pub mod auth;
pub mod classify;
pub mod config;
pub mod error;
pub mod input;
pub mod package;
pub mod report;
pub mod run;
pub mod yolo;

pub use auth::{CredentialStore, Session};
pub use classify::{Classification, Classifier, Detection, Detector, SharedModel};
pub use config::Config;
pub use error::{AuthError, ClassifyError, ConfigError, RunError};
pub use input::{InputRow, read_input_rows};
pub use report::{ClassificationResult, Label, ReportFormat, RunSummary};
pub use run::{RunEvent, RunOptions, RunOutput, RunProgressCallback, RunState, execute_run};

const BANNER: &str = r#"
   ██████╗ ███████╗██████╗ ██╗   ██╗███╗   ██╗ ██████╗
  ██╔════╝ ██╔════╝██╔══██╗██║   ██║████╗  ██║██╔════╝
  ██║  ███╗█████╗  ██║  ██║██║   ██║██╔██╗ ██║██║  ███╗
  ██║   ██║██╔══╝  ██║  ██║██║   ██║██║╚██╗██║██║   ██║
  ╚██████╔╝███████╗██████╔╝╚██████╔╝██║ ╚████║╚██████╔╝
   ╚═════╝ ╚══════╝╚═════╝  ╚═════╝ ╚═╝  ╚═══╝ ╚═════╝
        building classifier & URL converter
"#;

pub fn banner() -> &'static str {
    BANNER
}

pub fn print_banner() {
    println!("{}", BANNER);
}
