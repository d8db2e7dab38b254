//! ## SESSION OPTIONS
//! **Based on spec.md §4.5/§6 ("Options").**
//!
//! Builder-style option structs, in the same spirit as the teacher's
//! `ParameterSettings` (a plain public-field struct with a `Default` impl) —
//! plain structs with `with_*` methods read better in Rust than the abstract
//! interface's variadic `options...`. Every struct also carries
//! `custom_header`, generalizing `original_source/option.go`'s functional
//! `Option proto.Header` pattern (there, any outbound frame could gain
//! arbitrary extra headers; here every *Options type can).

/// Acknowledgement mode negotiated on `SUBSCRIBE` (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
  Auto,
  Client,
  ClientIndividual,
}

impl AckMode {
  pub fn as_str(self) -> &'static str {
    match self {
      AckMode::Auto => "auto",
      AckMode::Client => "client",
      AckMode::ClientIndividual => "client-individual",
    }
  }
}

impl Default for AckMode {
  fn default() -> Self {
    AckMode::Auto
  }
}

/// Options for [`crate::session::Session::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
  pub(crate) login: Option<String>,
  pub(crate) passcode: Option<String>,
  pub(crate) host: Option<String>,
  pub(crate) accept_version: Vec<String>,
  pub(crate) heart_beat_tx_ms: u32,
  pub(crate) heart_beat_rx_ms: u32,
  pub(crate) custom_headers: Vec<(String, String)>,
}

impl Default for ConnectOptions {
  fn default() -> Self {
    Self {
      login: None,
      passcode: None,
      host: None,
      accept_version: vec!["1.1".to_string(), "1.2".to_string()],
      heart_beat_tx_ms: 10_000,
      heart_beat_rx_ms: 10_000,
      custom_headers: Vec::new(),
    }
  }
}

impl ConnectOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_credentials(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
    self.login = Some(login.into());
    self.passcode = Some(passcode.into());
    self
  }

  pub fn with_heart_beat(mut self, tx_ms: u32, rx_ms: u32) -> Self {
    self.heart_beat_tx_ms = tx_ms;
    self.heart_beat_rx_ms = rx_ms;
    self
  }

  pub fn with_host(mut self, host: impl Into<String>) -> Self {
    self.host = Some(host.into());
    self
  }

  pub fn with_accept_version(mut self, versions: &[&str]) -> Self {
    self.accept_version = versions.iter().map(|s| s.to_string()).collect();
    self
  }

  pub fn custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.custom_headers.push((name.into(), value.into()));
    self
  }
}

/// Options for [`crate::session::Session::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
  pub(crate) content_type: Option<String>,
  pub(crate) receipt: bool,
  pub(crate) transaction: Option<String>,
  pub(crate) custom_headers: Vec<(String, String)>,
}

impl SendOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
    self.content_type = Some(content_type.into());
    self
  }

  pub fn with_receipt(mut self) -> Self {
    self.receipt = true;
    self
  }

  pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
    self.transaction = Some(transaction_id.into());
    self
  }

  pub fn custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.custom_headers.push((name.into(), value.into()));
    self
  }
}

/// Options for [`crate::session::Session::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
  pub(crate) ack: AckMode,
  pub(crate) receipt: bool,
  pub(crate) id: Option<String>,
  pub(crate) custom_headers: Vec<(String, String)>,
}

impl SubscribeOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_ack(mut self, ack: AckMode) -> Self {
    self.ack = ack;
    self
  }

  pub fn with_receipt(mut self) -> Self {
    self.receipt = true;
    self
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(id.into());
    self
  }

  pub fn custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.custom_headers.push((name.into(), value.into()));
    self
  }
}

/// Options shared by [`crate::session::Session::ack`] and
/// [`crate::session::Session::nack`], and by `Unsubscribe`.
#[derive(Debug, Clone, Default)]
pub struct AckOptions {
  pub(crate) transaction: Option<String>,
  pub(crate) receipt: bool,
  pub(crate) custom_headers: Vec<(String, String)>,
}

impl AckOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
    self.transaction = Some(transaction_id.into());
    self
  }

  pub fn with_receipt(mut self) -> Self {
    self.receipt = true;
    self
  }

  pub fn custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.custom_headers.push((name.into(), value.into()));
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn connect_options_default_offers_1_1_and_1_2() {
    let opts = ConnectOptions::new();
    assert_eq!(opts.accept_version, vec!["1.1", "1.2"]);
    assert_eq!(opts.heart_beat_tx_ms, 10_000);
  }

  #[test]
  fn builder_methods_chain_and_accumulate_custom_headers() {
    let opts = SendOptions::new()
      .with_content_type("text/plain")
      .with_receipt()
      .custom_header("x-a", "1")
      .custom_header("x-b", "2");
    assert_eq!(opts.content_type.as_deref(), Some("text/plain"));
    assert!(opts.receipt);
    assert_eq!(
      opts.custom_headers,
      vec![("x-a".to_string(), "1".to_string()), ("x-b".to_string(), "2".to_string())]
    );
  }

  #[test]
  fn ack_mode_as_str_matches_wire_values() {
    assert_eq!(AckMode::Auto.as_str(), "auto");
    assert_eq!(AckMode::Client.as_str(), "client");
    assert_eq!(AckMode::ClientIndividual.as_str(), "client-individual");
  }
}
