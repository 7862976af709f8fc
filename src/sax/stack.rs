use std::{collections::HashSet, sync::Arc};

use log::trace;
use url::Url;

use crate::{dtd::Entity, error::XMLError, sax::Locator, sax::source::InputSource};

/// What a [`Frame`] was pushed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Document,
    InternalSubset,
    ExternalSubset,
    ParameterEntity,
    GeneralEntity,
}

pub(crate) struct Frame {
    pub(crate) source: InputSource,
    pub(crate) entity: Option<Arc<Entity>>,
    pub(crate) kind: FrameKind,
    /// Depth of the element stack when this frame was pushed.
    /// An end tag at this depth would close an element opened outside of the frame.
    pub(crate) element_depth: usize,
    pub(crate) base_uri: Option<Arc<Url>>,
    /// Whether the locator follows the position of this frame.
    /// Internal entities are reported at the position of their reference.
    pub(crate) tracked: bool,
    system_id: Arc<str>,
}

impl Frame {
    pub(crate) fn new(
        source: InputSource,
        kind: FrameKind,
        entity: Option<Arc<Entity>>,
        base_uri: Option<Arc<Url>>,
        tracked: bool,
    ) -> Self {
        let system_id = source
            .system_id_arc()
            .or_else(|| base_uri.as_ref().map(|base| base.as_str().into()))
            .unwrap_or_default();
        Self {
            source,
            entity,
            kind,
            element_depth: 0,
            base_uri,
            tracked,
            system_id,
        }
    }

    pub(crate) fn with_element_depth(mut self, depth: usize) -> Self {
        self.element_depth = depth;
        self
    }

    /// The name reported to `start_entity` and `end_entity` for this frame.
    pub(crate) fn entity_name(&self) -> Option<String> {
        match self.kind {
            FrameKind::ExternalSubset => Some("[dtd]".to_owned()),
            FrameKind::ParameterEntity => self.entity.as_ref().map(|e| format!("%{}", e.name())),
            FrameKind::GeneralEntity => self.entity.as_ref().map(|e| e.name().to_owned()),
            FrameKind::Document | FrameKind::InternalSubset => None,
        }
    }
}

/// The explicit stack of active sub-streams.
///
/// Entity substitution pushes a frame and reading continues from it. When a frame is exhausted,
/// the parser pops it and reading continues from the frame below, as if both streams were
/// concatenated.
pub(crate) struct SourceStack {
    frames: Vec<Frame>,
    /// Addresses of the entities that are currently open.
    open: HashSet<usize>,
    locator: Arc<Locator>,
}

impl SourceStack {
    pub(crate) fn new(locator: Arc<Locator>) -> Self {
        Self {
            frames: vec![],
            open: HashSet::new(),
            locator,
        }
    }

    pub(crate) fn clear(&mut self, locator: Arc<Locator>) {
        self.frames.clear();
        self.open.clear();
        self.locator = locator;
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Check if `entity` is already open.
    pub(crate) fn is_open(&self, entity: &Arc<Entity>) -> bool {
        self.open.contains(&(Arc::as_ptr(entity) as usize))
    }

    /// Push a new frame.
    ///
    /// # Errors
    /// If the entity of `frame` is already open, returns [`XMLError::ParserEntityRecursion`]
    /// and the stack is not modified.
    pub(crate) fn push(&mut self, frame: Frame) -> Result<(), XMLError> {
        if let Some(entity) = frame.entity.as_ref() {
            if !self.open.insert(Arc::as_ptr(entity) as usize) {
                return Err(XMLError::ParserEntityRecursion);
            }
            trace!("push entity '{}' (depth: {})", entity.name(), self.frames.len());
        }
        if frame.tracked {
            self.locator.set_system_id(frame.system_id.clone());
            self.locator.set_public_id(frame.source.public_id_arc());
            self.locator.set_line(frame.source.line);
            self.locator.set_column(frame.source.column);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        if let Some(entity) = frame.entity.as_ref() {
            self.open.remove(&(Arc::as_ptr(entity) as usize));
            trace!("pop entity '{}' (depth: {})", entity.name(), self.frames.len());
        }
        if frame.tracked
            && let Some(top) = self.frames.iter().rev().find(|frame| frame.tracked)
        {
            self.locator.set_system_id(top.system_id.clone());
            self.locator.set_public_id(top.source.public_id_arc());
            self.locator.set_line(top.source.line);
            self.locator.set_column(top.source.column);
        }
        Some(frame)
    }

    /// The nearest base URI.
    pub(crate) fn base_uri(&self) -> Option<Arc<Url>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.base_uri.clone())
    }

    /// Check if a frame loaded from external markup is active.
    pub(crate) fn in_external_markup(&self) -> bool {
        self.frames.iter().any(|frame| {
            frame.kind == FrameKind::ExternalSubset
                || frame
                    .entity
                    .as_ref()
                    .is_some_and(|entity| entity.is_external())
        })
    }

    fn sync(&self) {
        if let Some(frame) = self.frames.last()
            && frame.tracked
        {
            self.locator.set_line(frame.source.line);
            self.locator.set_column(frame.source.column);
        }
    }

    /// Grow the buffer of the top frame.
    pub(crate) fn grow(&mut self) -> Result<(), XMLError> {
        match self.frames.last_mut() {
            Some(frame) => frame.source.grow(),
            None => Ok(()),
        }
    }

    pub(crate) fn content_bytes(&self) -> &[u8] {
        self.frames
            .last()
            .map(|frame| frame.source.content_bytes())
            .unwrap_or_default()
    }

    pub(crate) fn content_str(&self) -> &str {
        self.frames
            .last()
            .map(|frame| frame.source.content_str())
            .unwrap_or_default()
    }

    /// Check if the top frame is exhausted.
    ///
    /// Unlike [`InputSource::is_empty`], this grows the frame before checking.
    pub(crate) fn is_frame_end(&mut self) -> Result<bool, XMLError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(true);
        };
        frame.source.grow()?;
        Ok(frame.source.is_empty())
    }

    pub(crate) fn next_char(&mut self) -> Result<Option<char>, XMLError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(None);
        };
        let c = frame.source.next_char()?;
        self.sync();
        Ok(c)
    }

    pub(crate) fn next_char_if(
        &mut self,
        f: impl FnOnce(char) -> bool,
    ) -> Result<Option<char>, XMLError> {
        match self.peek_char()? {
            Some(c) if f(c) => self.next_char(),
            _ => Ok(None),
        }
    }

    pub(crate) fn peek_char(&mut self) -> Result<Option<char>, XMLError> {
        match self.frames.last_mut() {
            Some(frame) => frame.source.peek_char(),
            None => Ok(None),
        }
    }

    /// Skip `len` bytes of ASCII markup without line breaks on the top frame.
    pub(crate) fn advance(&mut self, len: usize) -> Result<(), XMLError> {
        if let Some(frame) = self.frames.last_mut() {
            frame.source.advance(len)?;
            self.sync();
        }
        Ok(())
    }
}
