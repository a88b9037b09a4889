//! The `rgw_frontends` option of a gateway.

use crate::api::object_store::{FrontendType, GatewaySpec};

pub const RGW_CERT_PATH: &str = "/etc/ceph/private/rgw-cert.pem";

/// Unprivileged port the gateway binds to when port 80 is requested off the host network.
pub const INTERNAL_HTTP_PORT: i32 = 8080;

/// Port the gateway process listens on for plain HTTP.
pub fn internal_port(gateway: &GatewaySpec) -> i32 {
    if gateway.port == 80 && !gateway.host_network {
        INTERNAL_HTTP_PORT
    } else {
        gateway.port
    }
}

/// Renders the listener part of the frontend config.
///
/// A secure port without a certificate yields nothing for that listener, and a
/// gateway without usable listeners yields an empty string.
pub fn port_string(gateway: &GatewaySpec) -> String {
    let mut listeners = Vec::new();
    let civetweb = gateway.frontend == FrontendType::Civetweb;

    if gateway.port > 0 {
        listeners.push(format!("port={}", internal_port(gateway)));
    }
    if gateway.secure_port > 0 && gateway.is_tls_enabled() {
        if civetweb {
            listeners.push(format!(
                "port={}s ssl_certificate={RGW_CERT_PATH}",
                gateway.secure_port
            ));
        } else {
            listeners.push(format!(
                "ssl_port={} ssl_certificate={RGW_CERT_PATH}",
                gateway.secure_port
            ));
        }
    }
    listeners.join(if civetweb { "+" } else { " " })
}

/// The full `rgw_frontends` value, e.g. `beast port=8080`.
pub fn frontend_config(gateway: &GatewaySpec) -> String {
    let frontend = match gateway.frontend {
        FrontendType::Beast => "beast",
        FrontendType::Civetweb => "civetweb",
    };
    format!("{frontend} {}", port_string(gateway))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::object_store::fixtures::{STORE, object_store};

    fn gateway() -> GatewaySpec {
        let mut gateway = object_store(STORE).spec.gateway;
        gateway.port = 0;
        gateway
    }

    #[test]
    fn test_beast_port_strings() {
        let mut gw = gateway();
        assert_eq!(port_string(&gw), "");

        gw.host_network = true;
        gw.port = 80;
        assert_eq!(port_string(&gw), "port=80");

        gw.secure_port = 443;
        gw.ssl_certificate_ref = Some("some-k8s-key-secret".into());
        assert_eq!(
            port_string(&gw),
            "port=80 ssl_port=443 ssl_certificate=/etc/ceph/private/rgw-cert.pem"
        );

        gw.port = 0;
        assert_eq!(
            port_string(&gw),
            "ssl_port=443 ssl_certificate=/etc/ceph/private/rgw-cert.pem"
        );

        gw.ssl_certificate_ref = None;
        assert_eq!(port_string(&gw), "");
    }

    #[test]
    fn test_internal_port_off_host_network() {
        let mut gw = gateway();
        gw.port = 80;
        assert_eq!(port_string(&gw), "port=8080");
        assert_eq!(frontend_config(&gw), "beast port=8080");
        gw.port = 7480;
        assert_eq!(internal_port(&gw), 7480);
    }

    #[test]
    fn test_civetweb_port_strings() {
        let mut gw = gateway();
        gw.frontend = FrontendType::Civetweb;
        gw.host_network = true;
        gw.port = 80;
        gw.secure_port = 443;
        gw.ssl_certificate_ref = Some("cert".into());
        assert_eq!(
            port_string(&gw),
            "port=80+port=443s ssl_certificate=/etc/ceph/private/rgw-cert.pem"
        );
    }
}
