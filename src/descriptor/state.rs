//! Per bind point descriptor state: which sets are bound, resolved dynamic buffers, and the memoized GPU
//! addresses of every descriptor table built from them.
//!
//! Every bind or push throws away all tables of the bind point. Tables are rebuilt lazily by the next draw or
//! dispatch that needs them, see the `tables` module.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::descriptor::descriptor_set::DescriptorSet;
use crate::descriptor::packed::{SsboAddr, UniformBufferDesc};
use crate::pipeline::pipeline_layout::{
    PipelineLayout, MAX_DYNAMIC_STORAGE_BUFFERS, MAX_DYNAMIC_UNIFORM_BUFFERS, MAX_SETS,
};
use crate::util::cached::Cached;
use crate::Error;

/// What occupies a descriptor set slot.
#[derive(Debug, Clone, Default)]
pub enum SetBinding {
    /// Nothing bound.
    #[default]
    Unbound,
    /// A set bound with `bind_descriptor_sets`.
    Bound(Arc<DescriptorSet>),
    /// The push descriptor set of this slot.
    Pushed,
}

/// The descriptor tables of a bind point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Uniform buffer table, including dynamic uniform buffers and the dynamic storage buffer slot.
    UniformBuffers,
    /// Texture table.
    Textures,
    /// Sampler table, with the dummy sampler first.
    Samplers,
    /// Attribute buffer and attribute tables used for storage image access.
    ImageAttributes,
    /// Addresses of the dynamic storage buffers.
    DynamicStorageBuffers,
}

impl TableKind {
    /// Every table kind.
    pub const ALL: [TableKind; 5] = [
        TableKind::UniformBuffers,
        TableKind::Textures,
        TableKind::Samplers,
        TableKind::ImageAttributes,
        TableKind::DynamicStorageBuffers,
    ];
}

/// GPU addresses of the two image attribute tables.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ImageAttributeTables {
    /// Attribute buffer table, two entries per image plus a terminator.
    pub buffers: u64,
    /// Attribute table, one entry per image.
    pub attributes: u64,
}

/// Descriptor state of one bind point.
#[derive(Debug, Default)]
pub struct DescriptorState {
    pub(crate) sets: [SetBinding; MAX_SETS],
    pub(crate) push_sets: [Option<Box<DescriptorSet>>; MAX_SETS],
    pub(crate) dyn_ubos: [UniformBufferDesc; MAX_DYNAMIC_UNIFORM_BUFFERS as usize],
    pub(crate) dyn_ssbos: [SsboAddr; MAX_DYNAMIC_STORAGE_BUFFERS as usize],
    pub(crate) ubos: Cached<u64>,
    pub(crate) textures: Cached<u64>,
    pub(crate) samplers: Cached<u64>,
    pub(crate) img: Cached<ImageAttributeTables>,
    pub(crate) dyn_desc_ubo: Cached<u64>,
    pub(crate) push_uniforms: Cached<u64>,
}

impl DescriptorState {
    /// The set currently satisfying slot `index`, bound or pushed.
    pub fn set(&self, index: usize) -> Option<&DescriptorSet> {
        match self.sets.get(index)? {
            SetBinding::Unbound => None,
            SetBinding::Bound(set) => Some(set),
            SetBinding::Pushed => self.push_sets[index].as_deref(),
        }
    }

    /// What occupies slot `index`.
    pub fn binding(&self, index: usize) -> Option<&SetBinding> {
        self.sets.get(index)
    }

    /// Resolved dynamic uniform buffer descriptors, indexed by layout slot.
    pub fn dynamic_uniform_buffers(&self) -> &[UniformBufferDesc] {
        &self.dyn_ubos
    }

    /// Resolved dynamic storage buffer addresses, indexed by layout slot.
    pub fn dynamic_storage_buffers(&self) -> &[SsboAddr] {
        &self.dyn_ssbos
    }

    /// Memoized address of a table, `None` if it must be rebuilt before use.
    pub fn table_address(&self, kind: TableKind) -> Option<u64> {
        match kind {
            TableKind::UniformBuffers => self.ubos.get(),
            TableKind::Textures => self.textures.get(),
            TableKind::Samplers => self.samplers.get(),
            TableKind::ImageAttributes => self.img.get().map(|img| img.attributes),
            TableKind::DynamicStorageBuffers => self.dyn_desc_ubo.get(),
        }
    }

    /// Memoized address of the push uniform blob.
    pub fn push_uniforms_address(&self) -> Option<u64> {
        self.push_uniforms.get()
    }

    /// Drop every memoized descriptor table.
    pub fn invalidate_tables(&mut self) {
        self.ubos.invalidate();
        self.textures.invalidate();
        self.samplers.invalidate();
        self.img.invalidate();
        self.dyn_desc_ubo.invalidate();
    }

    /// Drop the memoized push uniform blob.
    pub fn invalidate_push_uniforms(&mut self) {
        self.push_uniforms.invalidate();
    }

    /// Bind sets starting at `first_set`, resolving their dynamic buffers with `offsets`.
    ///
    /// Offsets are consumed in set order, then binding order, then array element order.
    /// # Errors
    /// * Fails with [`Error::InvalidSetIndex`] if a set index is outside the pipeline layout.
    /// * Fails with [`Error::DynamicOffsetCountMismatch`] if `offsets` does not hold exactly one offset per
    ///   dynamic descriptor of the bound sets.
    ///
    /// Nothing is bound on failure.
    pub fn bind_sets(
        &mut self,
        layout: &PipelineLayout,
        first_set: u32,
        sets: &[Arc<DescriptorSet>],
        offsets: &[u32],
    ) -> Result<()> {
        let end = first_set as usize + sets.len();
        if end > layout.set_count() || end > MAX_SETS {
            return Err(Error::InvalidSetIndex(end.saturating_sub(1) as u32).into());
        }

        let expected = sets
            .iter()
            .map(|set| set.layout().dynamic_offset_count() as usize)
            .sum::<usize>();
        if expected != offsets.len() {
            return Err(Error::DynamicOffsetCountMismatch {
                expected,
                got: offsets.len(),
            }
            .into());
        }

        let mut dyn_ubos = self.dyn_ubos;
        let mut dyn_ssbos = self.dyn_ssbos;
        let mut offsets = offsets.iter().copied();

        for (i, set) in sets.iter().enumerate() {
            let index = first_set as usize + i;
            let base = layout.set_offsets(index).ok_or(Error::InvalidSetIndex(index as u32))?;
            for binding in set.layout().bindings().iter().filter(|binding| binding.is_dynamic()) {
                for element in 0..binding.count {
                    let dynamic_offset = offsets.next().unwrap_or_default() as u64;
                    if binding.ty == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC {
                        let src = (binding.dyn_ubo_idx + element) as usize;
                        let slot = (base.dyn_ubo_offset + binding.dyn_ubo_idx + element) as usize;
                        let desc = match &set.dyn_ubos[src] {
                            Some(range) => {
                                let (address, size) = range.resolve(dynamic_offset);
                                UniformBufferDesc::new(address, size)
                            }
                            None => UniformBufferDesc::default(),
                        };
                        *dyn_ubos.get_mut(slot).ok_or(Error::TooManyBindings {
                            what: "dynamic uniform buffers",
                            max: MAX_DYNAMIC_UNIFORM_BUFFERS,
                        })? = desc;
                    } else {
                        let src = (binding.dyn_ssbo_idx + element) as usize;
                        let slot = (base.dyn_ssbo_offset + binding.dyn_ssbo_idx + element) as usize;
                        let addr = match &set.dyn_ssbos[src] {
                            Some(range) => {
                                let (address, size) = range.resolve(dynamic_offset);
                                SsboAddr::new(address, size)
                            }
                            None => SsboAddr::default(),
                        };
                        *dyn_ssbos.get_mut(slot).ok_or(Error::TooManyBindings {
                            what: "dynamic storage buffers",
                            max: MAX_DYNAMIC_STORAGE_BUFFERS,
                        })? = addr;
                    }
                }
            }
        }

        self.dyn_ubos = dyn_ubos;
        self.dyn_ssbos = dyn_ssbos;
        for (i, set) in sets.iter().enumerate() {
            self.sets[first_set as usize + i] = SetBinding::Bound(set.clone());
        }
        self.invalidate_tables();
        Ok(())
    }

    /// Write descriptors into the push set of slot `set` and make it the active set of that slot.
    ///
    /// The push set is created on first use, and recreated when the layout of the slot changes.
    /// # Errors
    /// * Fails with [`Error::InvalidSetIndex`] if the slot is outside the pipeline layout.
    /// * Fails with [`Error::NotPushDescriptorLayout`] if the slot's layout is not a push descriptor layout.
    /// * Fails if `write` fails. The push set is left untouched in that case.
    pub fn push_set(
        &mut self,
        layout: &PipelineLayout,
        set: u32,
        write: impl FnOnce(&mut DescriptorSet) -> Result<()>,
    ) -> Result<()> {
        let index = set as usize;
        let set_layout = layout.set_layout(index).ok_or(Error::InvalidSetIndex(set))?;
        if !set_layout.is_push_descriptor() {
            return Err(Error::NotPushDescriptorLayout(set).into());
        }

        let mut scratch = match &self.push_sets[index] {
            Some(existing) if Arc::ptr_eq(existing.layout(), set_layout) => existing.clone(),
            _ => Box::new(DescriptorSet::new(set_layout.clone())),
        };
        write(&mut scratch)?;
        self.push_sets[index] = Some(scratch);

        self.sets[index] = SetBinding::Pushed;
        self.invalidate_tables();
        Ok(())
    }

    /// Forget every binding and memoized table.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
