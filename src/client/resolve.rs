//! Address resolution for dial targets: explicit `host:port` pairs pass
//! through unchanged, otherwise an SRV lookup enumerates candidate targets,
//! falling back to `host:default_port` when the name has no SRV records.
//!
//! Grounded in the original dialer's `getAddrs`, with the SRV lookup itself
//! abstracted behind [`SrvResolver`] so the fallback/precedence logic is
//! testable without a real resolver or network access.

use std::future::Future;
use std::pin::Pin;

/// One candidate dial target returned by SRV resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub host: String,
    pub port: u16,
}

/// Abstracts the SRV lookup so tests can supply canned answers instead of
/// querying real DNS. Hand-rolled rather than via `async-trait`: a single
/// method, object-safe, no need for the macro's expansion.
pub trait SrvResolver: Send + Sync {
    /// Looks up `_{service}._tcp.{name}`. `Ok(empty vec)` means "no SRV
    /// records for this name", which the caller treats as "fall back to the
    /// default port", matching `net.LookupSRV` returning `ErrNotFound`.
    fn lookup_srv<'a>(
        &'a self,
        name: &'a str,
        service: &'a str,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<Vec<SrvTarget>>> + Send + 'a>>;
}

/// The production resolver, backed by `hickory-resolver`'s system
/// configuration.
pub struct HickoryResolver {
    inner: hickory_resolver::TokioAsyncResolver,
}

impl HickoryResolver {
    pub fn from_system_conf() -> std::io::Result<Self> {
        let inner = hickory_resolver::TokioAsyncResolver::tokio_from_system_conf()?;
        Ok(HickoryResolver { inner })
    }
}

impl SrvResolver for HickoryResolver {
    fn lookup_srv<'a>(
        &'a self,
        name: &'a str,
        service: &'a str,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<Vec<SrvTarget>>> + Send + 'a>> {
        let query = format!("_{service}._tcp.{name}");
        Box::pin(async move {
            match self.inner.srv_lookup(query).await {
                Ok(lookup) => Ok(lookup
                    .iter()
                    .map(|srv| SrvTarget {
                        host: srv.target().to_utf8().trim_end_matches('.').to_string(),
                        port: srv.port(),
                    })
                    .collect()),
                Err(e) if e.is_no_records_found() => Ok(Vec::new()),
                Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
            }
        })
    }
}

/// Resolves `name` (a bare host, or `host:port`) to dial targets plus the
/// common name to present as the TLS server name.
///
/// If `name` already carries a port, it is used verbatim and no SRV lookup
/// happens. Otherwise `_{service}._tcp.{name}` is queried; its results (in
/// answer order) become the target list. Absence of SRV records falls back
/// to a single `{name, default_port}` target. A resolver error other than
/// "no records" propagates.
pub async fn get_addrs(
    resolver: &dyn SrvResolver,
    name: &str,
    service: &str,
    default_port: u16,
) -> std::io::Result<(Vec<SrvTarget>, String)> {
    if let Some((host, port_str)) = name.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return Ok((
                vec![SrvTarget {
                    host: host.to_string(),
                    port,
                }],
                host.to_string(),
            ));
        }
    }

    let cn = name.to_string();
    let targets = resolver.lookup_srv(name, service).await?;
    if targets.is_empty() {
        return Ok((
            vec![SrvTarget {
                host: name.to_string(),
                port: default_port,
            }],
            cn,
        ));
    }
    Ok((targets, cn))
}
