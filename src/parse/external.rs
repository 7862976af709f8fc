use std::sync::Arc;

use log::debug;
use url::Url;

use crate::{
    dtd::{
        Dependency, Dtd, ResourceCache,
        cache::{content_urn, file_urn, public_id_urn},
    },
    error::XMLError,
    sax::{
        handler::SAXHandler,
        parser::{ParserOption, XMLReader, open_url, resolve_url},
        source::InputSource,
    },
};

/// An external entity or subset ready to be pushed.
pub(crate) struct ExternalResource {
    pub(crate) source: InputSource,
    pub(crate) base_uri: Option<Arc<Url>>,
    /// The identity URN, if the resource has one.
    pub(crate) urn: Option<String>,
    /// Computed only while caching is enabled.
    pub(crate) fingerprint: Option<String>,
}

impl<H: SAXHandler> XMLReader<H> {
    /// The cache, if results may be cached.
    pub(crate) fn caching(&self) -> Option<Arc<ResourceCache>> {
        if self.config.is_enable(ParserOption::ResultCaching) {
            self.cache.clone()
        } else {
            None
        }
    }

    /// The identity URN of a resource, computed without reading it.
    ///
    /// Public identifiers are used only if `PublicIdCaching` is enabled.
    pub(crate) fn identity_urn(&self, public_id: Option<&str>, url: Option<&Url>) -> Option<String> {
        if self.config.is_enable(ParserOption::PublicIdCaching)
            && let Some(public_id) = public_id
        {
            return Some(public_id_urn(public_id));
        }
        url.and_then(file_urn)
    }

    /// Open an external resource.
    ///
    /// The entity resolver is asked first. If it declines, `system_id` is resolved against
    /// `base_uri` and opened if its scheme is allowed.
    pub(crate) fn fetch_external(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        base_uri: Option<&Arc<Url>>,
    ) -> Result<(InputSource, Option<Arc<Url>>), XMLError> {
        let base = base_uri.map(|base| base.as_ref());
        let resolved =
            self.handler
                .resolve_entity(name, public_id, base.map(|base| base.as_str()), system_id)?;
        let (mut source, url) = match resolved {
            Some(source) => {
                let url = source
                    .system_id()
                    .map(|id| resolve_url(id, base))
                    .unwrap_or_else(|| resolve_url(system_id, base))
                    .ok();
                (source, url)
            }
            None => {
                let url = resolve_url(system_id, base)?;
                if !self.config.is_scheme_allowed(url.scheme()) {
                    debug!("access to '{url}' is denied");
                    return Err(XMLError::ParserExternalAccessDenied);
                }
                let source = open_url(&url, None, self.config.input_buffer_size())?;
                (source, Some(url))
            }
        };
        if source.system_id().is_none()
            && let Some(url) = url.as_ref()
        {
            source.set_system_id(url.as_str());
        }
        if source.public_id().is_none()
            && let Some(public_id) = public_id
        {
            source.set_public_id(public_id);
        }
        source.set_version(self.version);
        Ok((source, url.map(Arc::new)))
    }

    /// Open an external resource through the entity text cache.
    pub(crate) fn load_external(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        base_uri: Option<&Arc<Url>>,
    ) -> Result<ExternalResource, XMLError> {
        let Some(cache) = self.caching() else {
            let (source, base_uri) = self.fetch_external(name, public_id, system_id, base_uri)?;
            return Ok(ExternalResource {
                source,
                base_uri,
                urn: None,
                fingerprint: None,
            });
        };

        let url = resolve_url(system_id, base_uri.map(|base| base.as_ref())).ok();
        let urn = self.identity_urn(public_id, url.as_ref());
        if let Some(urn) = urn.as_deref()
            && let Some(text) = cache.lookup_entity_text(urn, self.version)
        {
            debug!("entity text cache hit: {urn}");
            let system_id = url.as_ref().map_or(system_id, |url| url.as_str());
            let source = self.cached_source(&text, public_id, system_id);
            return Ok(ExternalResource {
                source,
                base_uri: url.map(Arc::new),
                urn: Some(urn.to_owned()),
                fingerprint: Some(content_urn(&text)),
            });
        }

        let (mut source, base_uri) = self.fetch_external(name, public_id, system_id, base_uri)?;
        let text: Arc<str> = source.read_to_string()?.into();
        if let Some(urn) = urn.as_deref() {
            cache.store_entity_text(urn, self.version, text.clone());
        }
        let system_id = source.system_id().unwrap_or(system_id).to_owned();
        let public_id = source.public_id().map(str::to_owned);
        let cached = self.cached_source(&text, public_id.as_deref(), &system_id);
        Ok(ExternalResource {
            source: cached,
            base_uri,
            urn,
            fingerprint: Some(content_urn(&text)),
        })
    }

    pub(crate) fn cached_source(&self, text: &str, public_id: Option<&str>, system_id: &str) -> InputSource {
        let mut source = InputSource::from_content(text);
        source.set_system_id(system_id);
        if let Some(public_id) = public_id {
            source.set_public_id(public_id);
        }
        source.set_version(self.version);
        source
    }

    /// Record `resource` as a dependency of the DTD being built.
    pub(crate) fn record_dependency(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        base_uri: Option<Arc<Url>>,
        resource: &ExternalResource,
    ) -> Result<(), XMLError> {
        let Some(fingerprint) = resource.fingerprint.as_deref() else {
            return Ok(());
        };
        if !self.is_building_dtd() {
            return Ok(());
        }
        let dependency = Dependency {
            name: name.into(),
            public_id: public_id.map(Into::into),
            system_id: system_id.into(),
            base_uri,
            urn: resource.urn.as_deref().map(Into::into),
            fingerprint: fingerprint.into(),
        };
        self.dtd_mut()?.add_dependency(dependency)
    }

    /// Check if every dependency of a cached DTD is unchanged.
    ///
    /// Dependencies identified by a file URN are compared by modification time. Others,
    /// including those identified by a public identifier, are fetched again and compared by
    /// content.
    /// `skip` names a dependency that has already been checked by the caller.
    pub(crate) fn revalidate(&mut self, dtd: &Dtd, skip: Option<&str>) -> bool {
        for dependency in dtd.dependencies() {
            if skip == Some(&*dependency.name) {
                continue;
            }
            let base = dependency.base_uri.as_ref();
            if let Some(urn) = dependency.urn.as_deref()
                && !urn.starts_with("urn:")
            {
                let current = resolve_url(&dependency.system_id, base.map(|base| base.as_ref()))
                    .ok()
                    .and_then(|url| file_urn(&url));
                if current.as_deref() != Some(urn) {
                    debug!("dependency '{}' is modified", dependency.name);
                    return false;
                }
                continue;
            }
            let fetched = self
                .fetch_external(
                    &dependency.name,
                    dependency.public_id.as_deref(),
                    &dependency.system_id,
                    base,
                )
                .and_then(|(mut source, _)| source.read_to_string());
            match fetched {
                Ok(text) if content_urn(&text) == *dependency.fingerprint => {}
                Ok(text) => {
                    debug!("dependency '{}' is modified", dependency.name);
                    // the stored text is stale as well
                    if let (Some(urn), Some(cache)) = (dependency.urn.as_deref(), self.caching()) {
                        cache.store_entity_text(urn, self.version, text.into());
                    }
                    return false;
                }
                Err(_) => {
                    debug!("dependency '{}' cannot be fetched", dependency.name);
                    return false;
                }
            }
        }
        true
    }
}
