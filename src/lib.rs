//! Sealed-cookie OpenID Connect sessions for axum - Keycloak refresh rotation, skew-aware renewal,
//! and a default-deny request gate.
//!
//! The session state lives entirely in an encrypted cookie: [`codec::TokenCodec`] seals a
//! [`session::TokenRecord`], [`session::classify`] decides whether it is fresh, expiring, or
//! errored, [`refresh::RefreshCoordinator`] renews it through [`provider::ProviderClient`], and
//! [`gate::session_gate`] ties the pipeline into an axum middleware.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod redirect;
pub mod refresh;
pub mod session;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by integration tests; enabled via `cfg(test)` or
	//! the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::SessionConfig,
		gate::SessionGate,
		http::ReqwestHttpClient,
		session::{Identity, TokenRecord},
	};

	/// Client identifier used by test fixtures.
	pub const TEST_CLIENT_ID: &str = "cemetery-web";
	/// Client secret used by test fixtures.
	pub const TEST_CLIENT_SECRET: &str = "client-secret-for-tests";
	/// Signing secret used by test fixtures.
	pub const TEST_SIGNING_SECRET: &str = "0123456789abcdef0123456789abcdef-test-signing";

	/// Builds a configuration whose issuer points at `issuer` (typically an `httpmock` server).
	pub fn test_config(issuer: &str, base_path: &str) -> SessionConfig {
		SessionConfig::builder()
			.issuer(issuer)
			.client_id(TEST_CLIENT_ID)
			.client_secret(TEST_CLIENT_SECRET)
			.signing_secret(TEST_SIGNING_SECRET)
			.app_url("http://app.localhost:3000")
			.base_path(base_path)
			.app_name("cemetery")
			.build()
			.expect("Test configuration should be valid.")
	}

	/// Builds a reqwest-backed gate from [`test_config`].
	pub fn build_test_gate(issuer: &str, base_path: &str) -> Arc<SessionGate<ReqwestHttpClient>> {
		let config = test_config(issuer, base_path);

		Arc::new(SessionGate::new(config).expect("Test gate should build."))
	}

	/// Builds a record for a fixed test identity.
	pub fn test_record(access: &str, refresh: Option<&str>, expires_at: i64) -> TokenRecord {
		let identity = Identity {
			subject_id: "user-1".into(),
			display_name: "Ada Lovelace".into(),
			email: Some("ada@example.com".into()),
		};
		let mut builder =
			TokenRecord::builder(identity).access_token(access).expires_at(expires_at);

		if let Some(refresh) = refresh {
			builder = builder.refresh_token(refresh);
		}

		builder.build().expect("Test record should build.")
	}

	/// Current clock as epoch seconds.
	pub fn now_epoch() -> i64 {
		OffsetDateTime::now_utc().unix_timestamp()
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use {axum, url};
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _};
