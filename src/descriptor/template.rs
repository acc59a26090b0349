//! Descriptor update templates: a precomputed list of writes that reads its descriptors from a flat array.

use anyhow::Result;
use ash::vk;

use crate::descriptor::descriptor_set::{Descriptor, DescriptorSet};
use crate::Error;

/// One entry of an update template. Element `i` of the write is read from `data[offset + i * stride]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorUpdateTemplateEntry {
    /// Destination binding.
    pub binding: u32,
    /// First destination array element.
    pub array_element: u32,
    /// Number of consecutive array elements written.
    pub count: u32,
    /// Descriptor type of the destination binding.
    pub ty: vk::DescriptorType,
    /// Index of the first descriptor in the data array.
    pub offset: usize,
    /// Distance between consecutive descriptors in the data array.
    pub stride: usize,
}

/// A reusable list of descriptor writes.
#[derive(Debug, Clone, Default)]
pub struct DescriptorUpdateTemplate {
    entries: Vec<DescriptorUpdateTemplateEntry>,
}

impl DescriptorUpdateTemplate {
    /// Create a template from its entries.
    pub fn new(entries: Vec<DescriptorUpdateTemplateEntry>) -> Self {
        Self {
            entries,
        }
    }

    /// Entries of the template.
    pub fn entries(&self) -> &[DescriptorUpdateTemplateEntry] {
        &self.entries
    }

    /// Apply every write of this template to a set.
    /// # Errors
    /// * Fails if an entry reads past the end of `data`, or any write fails as in [`DescriptorSet::write`].
    pub fn apply(&self, set: &mut DescriptorSet, data: &[Descriptor]) -> Result<()> {
        for entry in &self.entries {
            let layout = *set.layout().binding(entry.binding).ok_or(Error::NoBinding(entry.binding))?;
            if layout.ty != entry.ty {
                return Err(Error::DescriptorTypeMismatch {
                    binding: entry.binding,
                    expected: layout.ty,
                }
                .into());
            }
            for i in 0..entry.count {
                let index = entry.offset + i as usize * entry.stride;
                let descriptor = data
                    .get(index)
                    .ok_or_else(|| anyhow::anyhow!("Update template reads descriptor {index} of {}", data.len()))?;
                set.write_one(&layout, entry.array_element + i, descriptor)?;
            }
        }
        Ok(())
    }
}
