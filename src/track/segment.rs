use crate::init::InitId;
use crate::sink::TrackKind;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use warp_media::mp4::{Atom, AtomType};
use warp_media::{Fragment, InitInfo, Sample};

/// One media segment: the atoms of a single segment stream, in arrival order.
///
/// Samples become available a fragment at a time, once a `moof` and the
/// `mdat` that follows it have both been pushed.
pub struct Segment {
    kind: TrackKind,
    init_id: InitId,
    init: Arc<InitInfo>,
    timestamp: u64,
    atoms: Vec<Bytes>,
    /// Index of the first atom not yet inspected by `take_samples`.
    cursor: usize,
    fragment: Option<Fragment>,
    finished: bool,
}

impl Segment {
    pub fn new(init_id: InitId, init: Arc<InitInfo>, timestamp: u64) -> Self {
        Self {
            kind: TrackKind::for_init(&init),
            init_id,
            init,
            timestamp,
            atoms: Vec::new(),
            cursor: 0,
            fragment: None,
            finished: false,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn init_id(&self) -> InitId {
        self.init_id
    }

    pub fn init(&self) -> &Arc<InitInfo> {
        &self.init
    }

    /// Presentation timestamp announced in the segment header, in ms.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn atoms(&self) -> &[Bytes] {
        &self.atoms
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append one complete top-level atom.
    pub fn push(&mut self, atom: Bytes) -> Result<()> {
        if self.finished {
            return Err(Error::protocol(format!(
                "segment {} received an atom after finish",
                self.timestamp
            )));
        }
        self.atoms.push(atom);
        Ok(())
    }

    /// Mark the segment complete. No atoms may follow.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::protocol(format!(
                "segment {} finished twice",
                self.timestamp
            )));
        }
        self.finished = true;
        Ok(())
    }

    /// Whether a `moof` is still waiting for its `mdat`.
    pub fn has_partial_fragment(&self) -> bool {
        self.fragment.is_some()
    }

    /// Parse atoms pushed since the last call and return the samples they
    /// completed.
    pub fn take_samples(&mut self) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();

        while let Some(atom) = self.atoms.get(self.cursor).cloned() {
            self.cursor += 1;

            let header = Atom::peek(&atom)?
                .ok_or_else(|| Error::parse(format!("truncated atom of {} bytes", atom.len())))?;

            match header.atom_type {
                AtomType::MOOF => {
                    if self.fragment.is_some() {
                        return Err(Error::parse("moof followed by another moof"));
                    }
                    self.fragment = Some(Fragment::parse(&atom)?);
                }
                AtomType::MDAT => {
                    let fragment = self
                        .fragment
                        .take()
                        .ok_or_else(|| Error::parse("mdat without a preceding moof"))?;
                    samples.extend(fragment.samples(&atom, &self.init)?);
                }
                other => {
                    tracing::trace!(atom = %other, size = atom.len(), "Passing over atom");
                }
            }
        }

        Ok(samples)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("kind", &self.kind)
            .field("init_id", &self.init_id)
            .field("timestamp", &self.timestamp)
            .field("atoms", &self.atoms.len())
            .field("finished", &self.finished)
            .finish()
    }
}
