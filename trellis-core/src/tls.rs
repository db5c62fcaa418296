//! TLS support for the HTTPS transport
//!
//! Loads a certificate chain and private key in PEM format into a rustls
//! server configuration.

use crate::Error;
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer},
};
use rustls_pemfile::{certs, private_key};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};

/// TLS configuration for the HTTPS server
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    /// Create a TLS configuration from certificate and key files
    ///
    /// ```no_run
    /// use trellis_core::tls::TlsConfig;
    ///
    /// # fn example() -> Result<(), trellis_core::Error> {
    /// let tls_config = TlsConfig::from_pem_files("cert.pem", "key.pem")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        let certs = load_certs(cert_path.as_ref())?;
        let key = load_private_key(key_path.as_ref())?;

        Self::from_parts(certs, key)
    }

    /// Create a TLS configuration from certificate and key bytes
    pub fn from_pem_bytes(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, Error> {
        let certs = read_certs(&mut BufReader::new(cert_pem))?;
        let key = read_private_key(&mut BufReader::new(key_pem))?;

        Self::from_parts(certs, key)
    }

    fn from_parts(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, Error> {
        if certs.is_empty() {
            return Err(Error::Config("No certificate found".to_string()));
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Config(format!("Failed to select TLS versions: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Config(format!("Failed to create TLS config: {}", e)))?;

        // The transport speaks HTTP/1.1 only.
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            server_config: Arc::new(config),
        })
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let file = File::open(path)
        .map_err(|e| Error::Config(format!("Failed to open certificate file: {}", e)))?;

    read_certs(&mut BufReader::new(file))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let file =
        File::open(path).map_err(|e| Error::Config(format!("Failed to open key file: {}", e)))?;

    read_private_key(&mut BufReader::new(file))
}

fn read_certs(reader: &mut dyn std::io::BufRead) -> Result<Vec<CertificateDer<'static>>, Error> {
    certs(reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("Failed to parse certificates: {}", e)))
}

fn read_private_key(reader: &mut dyn std::io::BufRead) -> Result<PrivateKeyDer<'static>, Error> {
    private_key(reader)
        .map_err(|e| Error::Config(format!("Failed to read private key: {}", e)))?
        .ok_or_else(|| Error::Config("No private key found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files() {
        let err = TlsConfig::from_pem_files("/nonexistent/cert.pem", "/nonexistent/key.pem")
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open certificate file"));
    }

    #[test]
    fn test_empty_pem() {
        let err = TlsConfig::from_pem_bytes(b"", b"").unwrap_err();
        assert!(err.to_string().contains("No private key found"));
    }
}
