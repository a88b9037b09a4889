use stackable_operator::cli::ProductOperatorRun;

use crate::{
    api::realm::realm_keys_secret_name, configuration::secret::Secret, rgw::multisite::RealmKeys,
};

#[derive(clap::Parser)]
pub enum RgwCommand {
    CreateRealmKeysSecret(RealmKeysSecretArgs),
    #[clap(flatten)]
    Framework(stackable_operator::cli::Command<RgwRun>),
}

/// Prints a `<realm>-keys` secret with freshly generated system user keys.
///
/// Needed when a realm is pulled from another cluster: both sides must carry the
/// same keys.
#[derive(clap::Parser, Debug, PartialEq, Eq)]
#[command(long_about = "")]
pub struct RealmKeysSecretArgs {
    #[arg(long, short = 'r')]
    pub realm: String,

    #[arg(long, short = 'n', default_value = "rook-ceph")]
    pub namespace: String,
}

impl RealmKeysSecretArgs {
    pub fn secret(&self) -> Secret<RealmKeys> {
        Secret::new(
            realm_keys_secret_name(&self.realm),
            self.namespace.clone(),
            RealmKeys::generate(),
        )
    }

    pub fn generate_secret(&self) -> anyhow::Result<()> {
        self.secret().print_yaml()?;
        Ok(())
    }
}

#[derive(clap::Parser)]
#[clap(about, author)]
pub struct Opts {
    #[clap(subcommand)]
    pub cmd: RgwCommand,
}

#[derive(clap::Parser)]
pub struct RgwRun {
    #[clap(flatten)]
    pub common: ProductOperatorRun,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_realm_keys_secret_args() {
        let opts = Opts::try_parse_from([
            "rgw-operator",
            "create-realm-keys-secret",
            "--realm",
            "realm-a",
        ])
        .unwrap();
        let RgwCommand::CreateRealmKeysSecret(args) = opts.cmd else {
            panic!("expected create-realm-keys-secret");
        };
        assert_eq!(args.namespace, "rook-ceph");

        let secret = args.secret();
        assert_eq!(secret.name(), "realm-a-keys");
        assert!(!secret.value().access_key.is_empty());
        assert_ne!(secret.value().access_key, secret.value().secret_key);
    }
}
