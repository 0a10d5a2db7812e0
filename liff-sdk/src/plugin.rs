//! SDK plugins installed through `use`.

use parking_lot::Mutex;

use crate::client::SdkClient;
use crate::error::{LiffError, Result, SdkError};

/// A plugin that extends the loaded SDK.
///
/// Registration is checked once, when the plugin is handed to the gate;
/// call sites never probe plugin shapes.
pub trait LiffPlugin: Send + Sync {
    /// Unique plugin name; also the key used to reject double registration.
    fn name(&self) -> &str;

    fn install(&self, client: &dyn SdkClient) -> std::result::Result<(), SdkError>;
}

/// Names of plugins installed on the current handle.
#[derive(Default)]
pub(crate) struct PluginRegistry {
    installed: Mutex<Vec<String>>,
}

impl PluginRegistry {
    /// Validate, install and record a plugin. The registry lock is held for
    /// the whole (synchronous) install so two registrations of the same name
    /// cannot both succeed.
    pub(crate) fn install(&self, plugin: &dyn LiffPlugin, client: &dyn SdkClient) -> Result<()> {
        let name = plugin.name().trim();
        if name.is_empty() {
            return Err(LiffError::InvalidValue("plugin name cannot be empty".into()));
        }
        let mut installed = self.installed.lock();
        if installed.iter().any(|n| n == name) {
            return Err(LiffError::InvalidValue(format!("plugin {name} is already installed")));
        }
        plugin.install(client)?;
        installed.push(name.to_string());
        tracing::debug!("installed LIFF plugin {name}");
        Ok(())
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.installed.lock().clone()
    }
}
