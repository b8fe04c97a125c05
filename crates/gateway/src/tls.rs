//! TLS fuer `wss://`-Verbindungen
//!
//! Zertifikatskette und privater Schluessel kommen als PEM-Dateien aus
//! der Konfiguration. Ohne TLS-Konfiguration laeuft der Gateway mit
//! unverschluesseltem `ws://`.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, private_key};
use tokio_rustls::TlsAcceptor;

use crate::error::{GatewayError, GatewayResult};

/// Installiert den ring-Provider als Prozess-Standard (mehrfacher Aufruf ist harmlos)
pub fn krypto_provider_installieren() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Laedt Zertifikat und Schluessel aus PEM-Dateien
pub fn tls_acceptor_laden(zertifikat: &Path, schluessel: &Path) -> GatewayResult<TlsAcceptor> {
    let zertifikat_pem = std::fs::read_to_string(zertifikat).map_err(|e| {
        GatewayError::Tls(format!(
            "Zertifikat '{}' nicht lesbar: {e}",
            zertifikat.display()
        ))
    })?;
    let schluessel_pem = std::fs::read_to_string(schluessel).map_err(|e| {
        GatewayError::Tls(format!(
            "Schluessel '{}' nicht lesbar: {e}",
            schluessel.display()
        ))
    })?;
    tls_acceptor_aus_pem(&zertifikat_pem, &schluessel_pem)
}

/// Baut einen TLS-Acceptor aus PEM-Text
pub fn tls_acceptor_aus_pem(zertifikat_pem: &str, schluessel_pem: &str) -> GatewayResult<TlsAcceptor> {
    krypto_provider_installieren();

    let kette = zertifikate_lesen(zertifikat_pem)?;
    if kette.is_empty() {
        return Err(GatewayError::Tls("Kein Zertifikat gefunden".into()));
    }
    let schluessel = schluessel_lesen(schluessel_pem)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(kette, schluessel)
        .map_err(|e| GatewayError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn zertifikate_lesen(pem: &str) -> GatewayResult<Vec<CertificateDer<'static>>> {
    let mut cursor = std::io::Cursor::new(pem.as_bytes());
    certs(&mut cursor)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Tls(format!("Zertifikat-Parsing fehlgeschlagen: {e}")))
}

fn schluessel_lesen(pem: &str) -> GatewayResult<PrivateKeyDer<'static>> {
    let mut cursor = std::io::Cursor::new(pem.as_bytes());
    private_key(&mut cursor)
        .map_err(|e| GatewayError::Tls(format!("Schluessel-Parsing fehlgeschlagen: {e}")))?
        .ok_or_else(|| GatewayError::Tls("Kein privater Schluessel gefunden".into()))
}
