use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;

use crate::config::Config;

/// TLS acceptor from `BOOKD_TLS_CERT` / `BOOKD_TLS_KEY`, or `None` for plaintext.
pub fn load_tls_acceptor(config: &Config) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (config.tls_cert.as_deref(), config.tls_key.as_deref()) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both BOOKD_TLS_CERT and BOOKD_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<_, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    server_config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert!(load_tls_acceptor(&config).unwrap().is_none());
    }

    #[test]
    fn half_configured_is_rejected() {
        let config = Config::from_lookup(|k| (k == "BOOKD_TLS_CERT").then(|| "/tmp/cert.pem".into()));
        let err = load_tls_acceptor(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_cert_file_errors() {
        let config = Config::from_lookup(|k| match k {
            "BOOKD_TLS_CERT" => Some("/nonexistent/bookd/cert.pem".into()),
            "BOOKD_TLS_KEY" => Some("/nonexistent/bookd/key.pem".into()),
            _ => None,
        });
        let err = load_tls_acceptor(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
