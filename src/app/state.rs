use std::path::PathBuf;

use crate::irc::SessionController;
use crate::model::ModelError;

/// Everything the session loop owns.
pub struct SessionState {
    pub controller: SessionController,
    /// Where account files live.
    pub accounts_dir: PathBuf,
}

impl SessionState {
    pub fn new(controller: SessionController, accounts_dir: PathBuf) -> Self {
        Self {
            controller,
            accounts_dir,
        }
    }

    pub fn save_accounts(&self) -> Result<(), ModelError> {
        self.controller.model().save(&self.accounts_dir)
    }

    /// Quits every connection and writes out whatever is still unsaved.
    pub fn shutdown(&mut self) {
        self.controller.quit_all();
        for e in self.controller.flush_all() {
            tracing::warn!(error = %e, "Log not saved on shutdown");
        }
        if let Err(e) = self.save_accounts() {
            tracing::warn!(error = %e, "Accounts not saved on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::testing::MockConnector;
    use crate::irc::ControllerOptions;
    use crate::model::storage::account_file_name;
    use crate::model::testing::{memory_model, params};

    #[tokio::test]
    async fn test_shutdown_quits_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let (mut model, _) = memory_model();
        let account = model.create_account("example", params("me")).unwrap();
        let id = model.add_account(account).unwrap();
        let connector = MockConnector::new();
        let controller = SessionController::new(model, Box::new(connector.clone()), ControllerOptions::default());
        let mut state = SessionState::new(controller, dir.path().to_path_buf());

        state.controller.connect(id).await.unwrap();
        state.shutdown();

        assert_eq!(connector.quit_count(), 1);
        assert!(!state.controller.is_connected(id));
        assert!(dir.path().join(account_file_name(id, "example")).exists());
    }
}
