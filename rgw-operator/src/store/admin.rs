//! Admin-ops access to a store on behalf of the resources that live in it.

use std::sync::Arc;

use rgw_admin_api::RgwAdminApi;
use snafu::{ResultExt, Snafu};
use stackable_operator::{client::Client, kube::ResourceExt};

use crate::{
    api::{
        object_store::ObjectStore,
        status::{HasReconcileStatus, Phase, ReconcileStatus},
    },
    multisite::topology::{get_referenced, store_context},
    reconcile::{ClassifyError, ErrorKind},
    rgw::{
        admin_ops::{AdminApiFactory, connect},
        cli::CliFactory,
    },
};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to resolve object store {store}"))]
    Resolve {
        source: crate::multisite::error::Error,
        store: String,
    },

    #[snafu(display("object store {store} is not ready yet"))]
    NotReady { store: String },

    #[snafu(display("failed to connect to the admin ops api of store {store}"))]
    Connect {
        source: crate::rgw::error::Error,
        store: String,
    },
}

impl ClassifyError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Resolve { source, .. } => source.kind(),
            Error::NotReady { .. } => ErrorKind::NotReady,
            Error::Connect { source, .. } => source.kind(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What a store-scoped controller needs to reach RGW.
pub struct StoreAccess {
    pub client: Client,
    pub cli: CliFactory,
    pub admin_factory: Arc<dyn AdminApiFactory>,
}

impl StoreAccess {
    /// The store named `store`, which must have finished its first reconcile.
    pub async fn ready_store(&self, store: &str, namespace: &str) -> Result<ObjectStore> {
        let store_obj: ObjectStore = get_referenced(&self.client, store, namespace)
            .await
            .context(ResolveSnafu { store })?;
        ensure_ready(&store_obj)?;
        Ok(store_obj)
    }

    /// The store named `store` if it still exists, whatever its phase.
    pub async fn existing_store(
        &self,
        store: &str,
        namespace: &str,
    ) -> Result<Option<ObjectStore>> {
        match get_referenced::<ObjectStore>(&self.client, store, namespace).await {
            Ok(store) => Ok(Some(store)),
            Err(crate::multisite::error::Error::Missing { .. }) => Ok(None),
            Err(source) => Err(source).context(ResolveSnafu { store }),
        }
    }

    pub async fn admin_api(&self, store: &ObjectStore) -> Result<Arc<dyn RgwAdminApi>> {
        let name = store.name_any();
        let namespace = store.namespace().unwrap_or_default();
        let rgw = store_context(&self.client, self.cli.for_namespace(&namespace), store)
            .await
            .context(ResolveSnafu { store: &name })?;
        connect(&rgw, self.admin_factory.as_ref())
            .await
            .context(ConnectSnafu { store: name })
    }
}

pub fn ensure_ready(store: &ObjectStore) -> Result<()> {
    let ready = store
        .reconcile_status()
        .is_some_and(|status| status.phase() == Phase::Ready);
    if ready {
        Ok(())
    } else {
        NotReadySnafu {
            store: store.name_any(),
        }
        .fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::object_store::{
        ObjectStoreStatus,
        fixtures::{STORE, object_store},
    };

    #[test]
    fn test_ensure_ready() {
        let mut store = object_store(STORE);
        let err = ensure_ready(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert_eq!(err.to_string(), "object store my-store is not ready yet");

        store.status = Some(ObjectStoreStatus {
            phase: Phase::Ready,
            ..ObjectStoreStatus::default()
        });
        assert!(ensure_ready(&store).is_ok());
    }
}
