//! Shared fixtures for in-crate tests.

use crate::backend::{FixtureBackend, FixtureData};
use crate::config::GatewayConfig;
use crate::gateway::GatewayContext;
use std::path::Path;
use std::sync::Arc;

pub const FIXTURE_YAML: &str = r#"
accounts:
  - user: alice
    password: pw
    apps: [440, 570]
    packages: [0]
  - user: bob
    password: secret
    two_factor_code: "R2D2X"
    apps: [10]
  - user: anonymous
    anonymous: true
apps:
  440:
    _change_number: 1001
    common:
      name: Team Fortress 2
      type: Game
    depots:
      "441": { name: TF2 Content }
  570:
    common:
      name: Dota 2
      type: game
  10:
    common:
      name: Counter-Strike
      type: game
  20:
    common:
      name: Team Fortress Classic
      type: game
  7:
    common:
      name: Steam Client
      type: config
  228980:
    common:
      name: Steamworks Common Redistributables
      type: Tool
  999:
    common:
      type: game
  31337:
    extended:
      developer: nobody
packages:
  0:
    packageid: 0
    appids: [7]
"#;

pub fn fixture_data() -> FixtureData {
    serde_yaml::from_str(FIXTURE_YAML).unwrap()
}

pub fn fixture_backend() -> Arc<FixtureBackend> {
    Arc::new(FixtureBackend::new(fixture_data()))
}

/// Config whose credential store lives in `credential_dir`.
pub fn test_config(credential_dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.credentials.location = Some(credential_dir.to_path_buf());
    config.cache.fetch_timeout_secs = 5;
    config.backend.auth_timeout_secs = 5;
    config
}

/// A gateway over the fixture backend with credentials under `credential_dir`.
pub fn test_context(credential_dir: &Path) -> (Arc<GatewayContext>, Arc<FixtureBackend>) {
    let backend = fixture_backend();
    let context = GatewayContext::new(&test_config(credential_dir), backend.clone()).unwrap();
    (context, backend)
}
