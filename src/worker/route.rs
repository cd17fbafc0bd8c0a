//! Request classification for intercepted fetches.

use crate::config::WorkerConfig;
use crate::http::Request;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg", "webp"];

/// Strategy an intercepted `GET` is handled by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Static,
  Image,
  Api,
  Dynamic,
}

/// Pick the strategy for `request`. Checks run static > image > API > dynamic, so exactly one
/// route applies.
pub fn classify(config: &WorkerConfig, request: &Request) -> Route {
  let path = request.url.path();

  if config.static_assets.iter().any(|asset| asset == path) || path.starts_with(&config.static_prefix)
  {
    Route::Static
  } else if request.accepts("image/") || has_image_extension(path) {
    Route::Image
  } else if path.starts_with(&config.api_prefix) {
    Route::Api
  } else {
    Route::Dynamic
  }
}

fn has_image_extension(path: &str) -> bool {
  path
    .rsplit_once('.')
    .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}
