//! # TLS Channel Builder
//!
//! Secure transport construction with a negotiation allow-list policy.
//!
//! The builder takes an immutable [`TlsPolicy`] and optional PEM credential
//! material, then restricts both the enabled protocol versions and the
//! enabled cipher suites to the intersection of the policy's ordered
//! allow-lists and what rustls supports. Allow-list order is preserved, so
//! the strongest mutually supported option is offered first in the
//! handshake.
//!
//! ## Responsibilities
//! - Build client configs (supplied trust anchors, or platform roots)
//! - Build server configs from identity material (cert chain + PKCS#8 key)
//! - Mint outbound secure sockets and secure listening handles
//! - Generate self-signed identities for development and tests

use std::sync::Arc;

use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig, ServerName};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, warn};

use crate::config::TlsPolicy;
use crate::error::{ProtocolError, Result};
use crate::transport::{
    disable_keepalive, BoxedTransport, ListenerFactory, TransportConnector, TransportListener,
};
use async_trait::async_trait;

/// Intersection of an ordered allow-list and a supported set, preserving
/// allow-list order.
pub fn usable<'s, T>(
    allowed: &[String],
    supported: &'s [T],
    name_of: impl Fn(&T) -> String,
) -> Vec<&'s T> {
    allowed
        .iter()
        .filter_map(|want| supported.iter().find(|&s| name_of(s) == *want))
        .collect()
}

fn suite_name(suite: &rustls::SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

fn version_name(version: &&'static rustls::SupportedProtocolVersion) -> String {
    match version.version {
        rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2".into(),
        rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3".into(),
        other => format!("{other:?}"),
    }
}

/// Server identity: certificate chain plus private key, both PEM.
pub struct Identity {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl Identity {
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// The PEM certificate chain, e.g. for distributing a self-signed
    /// certificate to clients as their trust anchor.
    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    fn cert_chain(&self) -> Result<Vec<Certificate>> {
        let chain = certs(&mut &self.cert_pem[..])
            .map_err(|_| ProtocolError::Tls("Failed to parse certificate".into()))?;
        if chain.is_empty() {
            return Err(ProtocolError::Tls("No certificates found".into()));
        }
        Ok(chain.into_iter().map(Certificate).collect())
    }

    fn private_key(&self) -> Result<PrivateKey> {
        let keys = pkcs8_private_keys(&mut &self.key_pem[..])
            .map_err(|_| ProtocolError::Tls("Failed to parse PKCS8 private key".into()))?;
        if let Some(key) = keys.into_iter().next() {
            return Ok(PrivateKey(key));
        }

        let keys = rsa_private_keys(&mut &self.key_pem[..])
            .map_err(|_| ProtocolError::Tls("Failed to parse RSA private key".into()))?;
        keys.into_iter()
            .next()
            .map(PrivateKey)
            .ok_or_else(|| ProtocolError::Tls("No supported private key format found".into()))
    }
}

/// Generate a self-signed identity for development/testing purposes.
pub fn generate_self_signed(hosts: Vec<String>) -> Result<Identity> {
    let cert = rcgen::generate_simple_self_signed(hosts)
        .map_err(|e| ProtocolError::Tls(format!("Certificate generation error: {e}")))?;
    let cert_pem = cert
        .serialize_pem()
        .map_err(|e| ProtocolError::Tls(format!("Certificate serialization error: {e}")))?;
    Ok(Identity::from_pem(cert_pem, cert.serialize_private_key_pem()))
}

/// Builds secure sockets and listening handles under one negotiation policy.
pub struct TlsChannelBuilder {
    policy: TlsPolicy,
    host: Option<String>,
    port: u16,
    identity: Option<Identity>,
    trust_anchors: Option<Vec<u8>>,
}

impl TlsChannelBuilder {
    pub fn new(policy: TlsPolicy) -> Self {
        Self {
            policy,
            host: None,
            port: 0,
            identity: None,
            trust_anchors: None,
        }
    }

    /// Sets the remote host for an outbound socket.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the server identity (certificate chain + key, PEM).
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets the trust anchors (CA bundle, PEM) used to verify the peer.
    /// Without this, platform roots are used.
    pub fn with_trust_anchors(mut self, ca_pem: impl Into<Vec<u8>>) -> Self {
        self.trust_anchors = Some(ca_pem.into());
        self
    }

    fn usable_suites(&self) -> Result<Vec<rustls::SupportedCipherSuite>> {
        let suites: Vec<rustls::SupportedCipherSuite> = usable(
            &self.policy.cipher_suites,
            rustls::ALL_CIPHER_SUITES,
            suite_name,
        )
        .into_iter()
        .copied()
        .collect();
        if suites.is_empty() {
            return Err(ProtocolError::Tls(
                "No mutually supported cipher suite".into(),
            ));
        }
        debug!(enabled = suites.len(), "cipher suites filtered");
        Ok(suites)
    }

    fn usable_versions(&self) -> Result<Vec<&'static rustls::SupportedProtocolVersion>> {
        let versions: Vec<&'static rustls::SupportedProtocolVersion> =
            usable(&self.policy.protocols, rustls::ALL_VERSIONS, version_name)
                .into_iter()
                .copied()
                .collect();
        if versions.is_empty() {
            return Err(ProtocolError::Tls(
                "No mutually supported protocol version".into(),
            ));
        }
        Ok(versions)
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        match &self.trust_anchors {
            Some(ca_pem) => {
                let anchors = certs(&mut &ca_pem[..])
                    .map_err(|_| ProtocolError::Tls("Failed to parse trust anchors".into()))?;
                if anchors.is_empty() {
                    return Err(ProtocolError::Tls("No trust anchors found".into()));
                }
                for cert in anchors {
                    roots.add(&Certificate(cert)).map_err(|e| {
                        ProtocolError::Tls(format!("Failed to add trust anchor: {e}"))
                    })?;
                }
            }
            None => {
                let native = rustls_native_certs::load_native_certs().map_err(|e| {
                    ProtocolError::Tls(format!("Failed to load native certs: {e}"))
                })?;
                for cert in native {
                    // Platform stores routinely carry a few stale entries.
                    if roots.add(&Certificate(cert.0)).is_err() {
                        warn!("skipping unparsable platform root certificate");
                    }
                }
            }
        }
        Ok(roots)
    }

    /// Builds the client-side rustls config under the policy.
    pub fn build_client_config(&self) -> Result<ClientConfig> {
        self.policy.validate()?;
        let suites = self.usable_suites()?;
        let versions = self.usable_versions()?;

        let config = ClientConfig::builder()
            .with_cipher_suites(&suites)
            .with_safe_default_kx_groups()
            .with_protocol_versions(&versions)
            .map_err(|e| ProtocolError::Tls(format!("Unusable protocol versions: {e}")))?
            .with_root_certificates(self.root_store()?)
            .with_no_client_auth();

        Ok(config)
    }

    /// Builds the server-side rustls config under the policy. Requires
    /// identity material.
    pub fn build_server_config(&self) -> Result<ServerConfig> {
        self.policy.validate()?;
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| ProtocolError::Tls("Server identity material required".into()))?;
        let suites = self.usable_suites()?;
        let versions = self.usable_versions()?;

        let config = ServerConfig::builder()
            .with_cipher_suites(&suites)
            .with_safe_default_kx_groups()
            .with_protocol_versions(&versions)
            .map_err(|e| ProtocolError::Tls(format!("Unusable protocol versions: {e}")))?
            .with_no_client_auth()
            .with_single_cert(identity.cert_chain()?, identity.private_key()?)
            .map_err(|e| ProtocolError::Tls(format!("Bad identity material: {e}")))?;

        Ok(config)
    }

    /// Connects an outbound secure socket to the configured host and port.
    pub async fn build_socket(&self) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| ProtocolError::Tls("Cannot create socket without host".into()))?;

        let connector = TlsConnector::from(Arc::new(self.build_client_config()?));
        let domain = ServerName::try_from(host)
            .map_err(|_| ProtocolError::Tls(format!("Invalid server name: {host}")))?;

        let stream = TcpStream::connect((host, self.port)).await?;
        disable_keepalive(&stream)?;
        let tls_stream = connector.connect(domain, stream).await?;
        Ok(tls_stream)
    }

    /// Binds a secure listening handle on the configured port.
    pub async fn build_listener(&self) -> Result<TlsTransportListener> {
        let acceptor = TlsAcceptor::from(Arc::new(self.build_server_config()?));
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let addr = listener.local_addr()?;
        debug!(%addr, "TLS listening");
        Ok(TlsTransportListener { listener, acceptor })
    }
}

/// Outbound connector handing encrypted transports to a connection.
pub struct TlsTransportConnector {
    connector: TlsConnector,
}

impl TlsTransportConnector {
    /// Builds the client config eagerly so policy and credential problems
    /// surface here rather than on the first connect.
    pub fn new(policy: TlsPolicy, trust_anchors: Option<Vec<u8>>) -> Result<Self> {
        let mut builder = TlsChannelBuilder::new(policy);
        if let Some(ca_pem) = trust_anchors {
            builder = builder.with_trust_anchors(ca_pem);
        }
        let config = builder.build_client_config()?;
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl TransportConnector for TlsTransportConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedTransport> {
        let domain = ServerName::try_from(host)
            .map_err(|_| ProtocolError::Tls(format!("Invalid server name: {host}")))?;
        let stream = TcpStream::connect((host, port)).await?;
        disable_keepalive(&stream)?;
        let tls_stream = self.connector.connect(domain, stream).await?;
        Ok(Box::new(tls_stream))
    }
}

/// Secure listening handle: accepts a TCP stream, then completes the TLS
/// handshake before handing the transport over.
pub struct TlsTransportListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

#[async_trait]
impl TransportListener for TlsTransportListener {
    async fn accept(&self) -> Result<BoxedTransport> {
        // Only TCP-level accept failures propagate; a peer failing its
        // handshake must not take the acceptor down with it.
        loop {
            let (stream, peer) = self.listener.accept().await?;
            disable_keepalive(&stream)?;
            match self.acceptor.accept(stream).await {
                Ok(tls_stream) => return Ok(Box::new(tls_stream)),
                Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
            }
        }
    }

    fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Listener factory wiring a TLS acceptor under one policy and identity.
pub struct TlsListenerFactory {
    policy: TlsPolicy,
    acceptor: TlsAcceptor,
}

impl TlsListenerFactory {
    pub fn new(policy: TlsPolicy, identity: Identity) -> Result<Self> {
        let config = TlsChannelBuilder::new(policy.clone())
            .with_identity(identity)
            .build_server_config()?;
        Ok(Self {
            policy,
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    pub fn policy(&self) -> &TlsPolicy {
        &self.policy
    }
}

#[async_trait]
impl ListenerFactory for TlsListenerFactory {
    async fn bind(&self, port: u16) -> Result<Box<dyn TransportListener>> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        debug!(%addr, "TLS listening");
        Ok(Box::new(TlsTransportListener {
            listener,
            acceptor: self.acceptor.clone(),
        }))
    }
}
