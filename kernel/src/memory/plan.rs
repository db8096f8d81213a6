// =============================================================================
// Identity-mapping plan
// =============================================================================
//
// The MMU is not turned on during bring-up. This module computes the layout
// the translation-table code will identity-map once it exists, so the
// numbers can be checked on real boards from the boot log today.
//
//   Region              Range                                 Attributes
//   ─────────────────────────────────────────────────────────────────────────
//   kernel image        [0, 1 MiB)                            NORMAL | CACHEABLE | PRIVILEGED
//   low RAM             [1 MiB, low end)                      NORMAL | CACHEABLE
//   video memory        [video base, + video size)            NORMAL | PRIVILEGED
//   high RAM            [1 GiB, tables)                       NORMAL | CACHEABLE
//   translation tables  [top + 1 - 100 MiB, top + 1)          NORMAL | CACHEABLE | PRIVILEGED
//   mailbox MMIO        0x4_7E00_B000, 4 KiB                  DEVICE | PRIVILEGED
//   GIC-400 MMIO        0x4_C004_0000, 32 KiB                 DEVICE | PRIVILEGED
//
// Empty regions are left out. Without a known top of memory neither the
// high RAM nor the translation-table region can be placed.
// =============================================================================

use arrayvec::ArrayVec;
use bitflags::bitflags;

use super::layout::HIGH_MEMORY_BASE;
use super::{KIB, MIB};
use crate::platform::firmware::MemoryGeometry;

/// Kernel image, loaded at 0x80000, plus the boot stack below it.
pub const KERNEL_IMAGE_SIZE: u64 = MIB;

/// Carved from the top of RAM for translation tables.
pub const TRANSLATION_TABLE_RESERVE: u64 = 100 * MIB;

/// The 4 KiB page holding the mailbox registers.
pub const MAILBOX_PAGE: u64 = khal::mailbox::MAILBOX_BASE & !(4 * KIB - 1);

/// Upper bound on planned regions.
pub const MAX_REGIONS: usize = 8;

bitflags! {
    /// How a planned region is to be mapped.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionAttributes: u32 {
        /// Ordinary memory.
        const NORMAL     = 1 << 0;
        /// Device-nGnRE memory; accesses are never merged or reordered.
        const DEVICE     = 1 << 1;
        /// Write-back cacheable. Only meaningful with NORMAL.
        const CACHEABLE  = 1 << 2;
        /// EL1 only.
        const PRIVILEGED = 1 << 3;
    }
}

impl RegionAttributes {
    pub const KERNEL: Self = Self::NORMAL.union(Self::CACHEABLE).union(Self::PRIVILEGED);
    pub const RAM: Self = Self::NORMAL.union(Self::CACHEABLE);
    pub const SHARED_WITH_GPU: Self = Self::NORMAL.union(Self::PRIVILEGED);
    pub const MMIO: Self = Self::DEVICE.union(Self::PRIVILEGED);
}

/// One identity-mapped range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegion {
    pub name: &'static str,
    pub base: u64,
    pub size: u64,
    pub attributes: RegionAttributes,
}

impl MappedRegion {
    pub fn end(&self) -> u64 {
        self.base + self.size
    }
}

/// The regions to identity-map, in the order they would be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingPlan {
    regions: ArrayVec<MappedRegion, MAX_REGIONS>,
}

impl MappingPlan {
    pub fn regions(&self) -> &[MappedRegion] {
        &self.regions
    }

    pub fn find(&self, name: &str) -> Option<&MappedRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Add `[base, end)` unless it is empty.
    fn add(&mut self, name: &'static str, base: u64, end: u64, attributes: RegionAttributes) {
        if end <= base {
            return;
        }
        // Never more than seven candidates.
        let _ = self.regions.try_push(MappedRegion {
            name,
            base,
            size: end - base,
            attributes,
        });
    }

    /// Print the plan.
    pub fn log(&self) {
        klog::info!("Mapping plan (identity, not applied):");
        for region in self.regions.iter() {
            klog::info!(
                "  {:<18} {:#012x}..{:#012x}  {:?}",
                region.name,
                region.base,
                region.end(),
                region.attributes,
            );
        }
    }
}

/// Compute the identity-mapping plan for `geometry`.
pub fn build(geometry: &MemoryGeometry) -> MappingPlan {
    let mut plan = MappingPlan::default();

    plan.add("kernel image", 0, KERNEL_IMAGE_SIZE, RegionAttributes::KERNEL);

    let low_end = geometry.low_memory_base.saturating_add(geometry.low_memory_size);
    plan.add(
        "low RAM",
        KERNEL_IMAGE_SIZE.max(geometry.low_memory_base),
        low_end,
        RegionAttributes::RAM,
    );

    plan.add(
        "video memory",
        geometry.video_memory_base,
        geometry.video_memory_base.saturating_add(geometry.video_memory_size),
        RegionAttributes::SHARED_WITH_GPU,
    );

    if geometry.top_of_memory != 0 {
        let ram_end = geometry.top_of_memory.saturating_add(1);
        let tables = ram_end.saturating_sub(TRANSLATION_TABLE_RESERVE);
        plan.add("high RAM", HIGH_MEMORY_BASE, tables, RegionAttributes::RAM);
        plan.add("translation tables", tables, ram_end, RegionAttributes::KERNEL);
    }

    plan.add(
        "mailbox MMIO",
        MAILBOX_PAGE,
        MAILBOX_PAGE + 4 * KIB,
        RegionAttributes::MMIO,
    );
    plan.add(
        "GIC-400 MMIO",
        khal::gic400::GIC_BLOCK_BASE,
        khal::gic400::GIC_BLOCK_BASE + khal::gic400::GIC_BLOCK_SIZE,
        RegionAttributes::MMIO,
    );

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GIB;

    fn geometry(top_of_memory: u64) -> MemoryGeometry {
        MemoryGeometry {
            low_memory_base: 0,
            low_memory_size: 0x3B40_0000,
            video_memory_base: 0x3B40_0000,
            video_memory_size: 0x04C0_0000,
            top_of_memory,
        }
    }

    #[test]
    fn four_gib_board_plan() {
        let plan = build(&geometry(0xFFFF_FFFF));
        let names: ArrayVec<&str, MAX_REGIONS> = plan.regions().iter().map(|r| r.name).collect();
        assert_eq!(
            &names[..],
            &[
                "kernel image",
                "low RAM",
                "video memory",
                "high RAM",
                "translation tables",
                "mailbox MMIO",
                "GIC-400 MMIO",
            ]
        );

        let tables = plan.find("translation tables").unwrap();
        assert_eq!(tables.base, 4 * GIB - 100 * MIB);
        assert_eq!(tables.end(), 4 * GIB);
        assert_eq!(plan.find("high RAM").unwrap().end(), tables.base);

        let low = plan.find("low RAM").unwrap();
        assert_eq!((low.base, low.end()), (MIB, 0x3B40_0000));
    }

    #[test]
    fn device_regions_are_not_cacheable() {
        let plan = build(&geometry(0x7FFF_FFFF));
        for name in ["mailbox MMIO", "GIC-400 MMIO", "video memory"] {
            let region = plan.find(name).unwrap();
            assert!(!region.attributes.contains(RegionAttributes::CACHEABLE), "{}", name);
            assert!(region.attributes.contains(RegionAttributes::PRIVILEGED));
        }
        assert_eq!(plan.find("mailbox MMIO").unwrap().base, 0x4_7E00_B000);
        assert_eq!(plan.find("GIC-400 MMIO").unwrap().size, 32 * KIB);
    }

    #[test]
    fn unknown_ram_leaves_out_high_regions() {
        let plan = build(&geometry(0));
        assert!(plan.find("high RAM").is_none());
        assert!(plan.find("translation tables").is_none());
        assert_eq!(plan.regions().len(), 5);
    }

    #[test]
    fn one_gib_board_has_no_high_ram() {
        let plan = build(&geometry(0x3FFF_FFFF));
        assert!(plan.find("high RAM").is_none());
        assert_eq!(plan.find("translation tables").unwrap().end(), GIB);
    }

    #[test]
    fn empty_firmware_geometry_skips_empty_regions() {
        let plan = build(&MemoryGeometry::default());
        assert!(plan.find("low RAM").is_none());
        assert!(plan.find("video memory").is_none());
        assert!(plan.find("kernel image").is_some());
    }
}
