use std::sync::Arc;

use clap::{Parser, crate_description, crate_version};
use dashmap::DashMap;
use futures::FutureExt;
use rgw_operator::{
    APP_NAME, OPERATOR_NAME,
    account::{self, controller::ACCOUNT_CONTROLLER_NAME},
    api::{
        account::ObjectStoreAccount, object_store::ObjectStore, realm::ObjectRealm,
        user::ObjectStoreUser, zone::ObjectZone, zone_group::ObjectZoneGroup,
    },
    built_info,
    cli::{Opts, RgwCommand, RgwRun},
    configuration::env::OperatorConfig,
    multisite::{
        self, realm::REALM_CONTROLLER_NAME, zone::ZONE_CONTROLLER_NAME,
        zone_group::ZONE_GROUP_CONTROLLER_NAME,
    },
    reconcile::{Substrate, events::KubeEventPublisher},
    rgw::{
        admin_ops::{AdminApiFactory, RgwAdminClientFactory, provisioner_name},
        cli::{CliFactory, ProcessExecutor},
        health::{KubeBucketStatusSink, ProbeRegistry, RustS3Connector},
    },
    store::{self, admin::StoreAccess, controller::STORE_CONTROLLER_NAME},
    user::{self, controller::USER_CONTROLLER_NAME},
};
use stackable_operator::{
    CustomResourceExt,
    cli::{Command, ProductOperatorRun},
    client,
    namespace::WatchNamespace,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    match opts.cmd {
        RgwCommand::CreateRealmKeysSecret(args) => args.generate_secret()?,
        RgwCommand::Framework(Command::Crd) => {
            ObjectStore::print_yaml_schema(built_info::PKG_VERSION)?;
            ObjectStoreUser::print_yaml_schema(built_info::PKG_VERSION)?;
            ObjectStoreAccount::print_yaml_schema(built_info::PKG_VERSION)?;
            ObjectRealm::print_yaml_schema(built_info::PKG_VERSION)?;
            ObjectZoneGroup::print_yaml_schema(built_info::PKG_VERSION)?;
            ObjectZone::print_yaml_schema(built_info::PKG_VERSION)?;
        }
        RgwCommand::Framework(Command::Run(RgwRun {
            common:
                ProductOperatorRun {
                    watch_namespace,
                    tracing_target,
                    cluster_info_opts,
                    ..
                },
        })) => {
            stackable_operator::logging::initialize_logging(
                "RGW_OPERATOR_LOG",
                APP_NAME,
                tracing_target,
            );
            stackable_operator::utils::print_startup_string(
                crate_description!(),
                crate_version!(),
                built_info::GIT_VERSION,
                built_info::TARGET,
                built_info::BUILT_TIME_UTC,
                built_info::RUSTC_VERSION,
            );

            let config = OperatorConfig::from_env()?;
            let watch_namespace = if config.watch_operator_namespace {
                WatchNamespace::One(config.operator_namespace.clone())
            } else {
                watch_namespace
            };
            tracing::info!(
                provisioner = %provisioner_name(
                    &config.operator_namespace,
                    config.provisioner_name_prefix.as_deref()
                ),
                watch_operator_namespace = config.watch_operator_namespace,
                "starting object store operator"
            );

            let client =
                client::initialize_operator(Some(OPERATOR_NAME.to_string()), &cluster_info_opts)
                    .await?;
            let kube = client.as_kube_client();
            let cli = CliFactory::new(
                Arc::new(ProcessExecutor),
                config.ceph_config_dir.clone(),
                config.cli_timeout,
            );
            let admin_factory: Arc<dyn AdminApiFactory> =
                Arc::new(RgwAdminClientFactory::new(config.admin_ops_timeout)?);

            let substrate = |controller: &str| {
                Substrate::new(Arc::new(KubeEventPublisher::new(
                    kube.clone(),
                    controller,
                )))
            };
            let store_access = || StoreAccess {
                client: client.clone(),
                cli: cli.clone(),
                admin_factory: admin_factory.clone(),
            };
            let multisite_ctx = |controller: &str| multisite::Ctx {
                client: client.clone(),
                cli: cli.clone(),
                substrate: substrate(controller),
            };

            let realm_controller = multisite::realm::create_realm_controller(
                &client,
                watch_namespace.clone(),
                multisite_ctx(REALM_CONTROLLER_NAME),
            )
            .boxed();
            let zone_group_controller = multisite::zone_group::create_zone_group_controller(
                &client,
                watch_namespace.clone(),
                multisite_ctx(ZONE_GROUP_CONTROLLER_NAME),
            )
            .boxed();
            let zone_controller = multisite::zone::create_zone_controller(
                &client,
                watch_namespace.clone(),
                multisite_ctx(ZONE_CONTROLLER_NAME),
            )
            .boxed();
            let store_controller = store::controller::create_store_controller(
                &client,
                watch_namespace.clone(),
                store::controller::Ctx {
                    access: store_access(),
                    connector: Arc::new(RustS3Connector),
                    sink: Arc::new(KubeBucketStatusSink::new(kube.clone())),
                    probes: ProbeRegistry::default(),
                    probe_interval: config.health_check_interval,
                    applied: DashMap::new(),
                    substrate: substrate(STORE_CONTROLLER_NAME),
                },
            )
            .boxed();
            let user_controller = user::controller::create_user_controller(
                &client,
                watch_namespace.clone(),
                user::controller::Ctx {
                    access: store_access(),
                    substrate: substrate(USER_CONTROLLER_NAME),
                },
            )
            .boxed();
            let account_controller = account::controller::create_account_controller(
                &client,
                watch_namespace.clone(),
                account::controller::Ctx {
                    access: store_access(),
                    substrate: substrate(ACCOUNT_CONTROLLER_NAME),
                },
            )
            .boxed();

            let futures = vec![
                realm_controller,
                zone_group_controller,
                zone_controller,
                store_controller,
                user_controller,
                account_controller,
            ];
            futures::future::select_all(futures).await;
        }
    };

    Ok(())
}
