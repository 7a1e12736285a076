mod dispatch;
mod logging;
mod types;

pub use dispatch::{ChangeNotifier, PermissionChangeListener};
pub use logging::LoggingListener;
pub use types::{ChangeCause, PermissionsChangedEvent};
