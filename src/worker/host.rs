use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use url::Url;

use super::push::Notification;

/// Services the worker's host runtime provides: lifecycle control, client pages and the
/// notification tray.
pub trait Host: Send + Sync {
  /// Activate this worker without waiting for the previous one's clients to close.
  fn skip_waiting(&self) -> impl Future<Output = Result<()>> + Send;

  /// Take control of every open page. Returns how many were claimed.
  fn claim_clients(&self) -> impl Future<Output = Result<usize>> + Send;

  fn show_notification(
    &self,
    notification: &Notification,
  ) -> impl Future<Output = Result<()>> + Send;

  fn close_notification(&self, title: &str) -> impl Future<Output = Result<()>> + Send;

  /// Focus or open a page at `url`.
  fn open_window(&self, url: &Url) -> impl Future<Output = Result<()>> + Send;
}

impl<H: Host> Host for Arc<H> {
  fn skip_waiting(&self) -> impl Future<Output = Result<()>> + Send {
    (**self).skip_waiting()
  }

  fn claim_clients(&self) -> impl Future<Output = Result<usize>> + Send {
    (**self).claim_clients()
  }

  fn show_notification(
    &self,
    notification: &Notification,
  ) -> impl Future<Output = Result<()>> + Send {
    (**self).show_notification(notification)
  }

  fn close_notification(&self, title: &str) -> impl Future<Output = Result<()>> + Send {
    (**self).close_notification(title)
  }

  fn open_window(&self, url: &Url) -> impl Future<Output = Result<()>> + Send {
    (**self).open_window(url)
  }
}
