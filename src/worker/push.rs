//! Push notifications shown by the worker.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::NotificationConfig;

pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

impl Notification {
  /// Build the notification for a push carrying `data` (plain text), or the default body.
  pub fn for_push(config: &NotificationConfig, data: Option<&[u8]>, now: DateTime<Utc>) -> Self {
    let body = match data {
      Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
      None => config.default_body.clone(),
    };

    let action = |action: &str, title: &str| NotificationAction {
      action: action.to_string(),
      title: title.to_string(),
      icon: config.badge.clone(),
    };

    Self {
      title: config.title.clone(),
      body,
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: vec![100, 50, 100],
      data: NotificationData {
        date_of_arrival: now.timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![
        action(EXPLORE_ACTION, "Explorar"),
        action(CLOSE_ACTION, "Cerrar"),
      ],
    }
  }
}
