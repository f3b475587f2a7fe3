//! Software translation cache.
//!
//! Four parallel arrays indexed by virtual page number hold one encoded
//! entry per (ring, access) quadrant: kernel-read, kernel-write, user-read,
//! user-write. An entry for virtual address `v` mapping the physical page of
//! `p` is
//!
//! ```text
//! ((v ^ p) & !0xFFF) | 1
//! ```
//!
//! so a single XOR recovers the physical offset of any address inside the
//! page, and the low bit doubles as the validity marker:
//!
//! | width | physical offset |
//! | ----- | --------------- |
//! | 8-bit | `v ^ (e & !1)` |
//! | 16-bit | `(v ^ e) & !1` |
//! | 32-bit | `(v ^ e) & !3` |
//! | 64-bit | `(v ^ e) & !7` |
//!
//! A bounded side-list records every populated VPN so that [`flush`] clears
//! only what was written instead of scanning all 2^20 slots. The list is the
//! source of truth for occupancy: a VPN is listed exactly once while any of
//! its four quadrants is nonzero, and the kernel-read quadrant is set for
//! every live mapping.
//!
//! [`flush`]: self::Tlb::flush

/// Translation array length: one slot per 4 KiB page of the 4 GiB space.
pub const TB_LEN: usize = 1 << 20;

/// Maximum number of cached page translations before a forced flush.
pub const TPAGES: usize = 4096;


pub struct Tlb {
    kernel_read: Vec<u32>,
    kernel_write: Vec<u32>,
    user_read: Vec<u32>,
    user_write: Vec<u32>,
    /// Populated VPNs, each listed once.
    cached: Vec<u32>,
}

impl Tlb {
    pub fn new() -> Self {
        Self {
            kernel_read: vec![0; TB_LEN],
            kernel_write: vec![0; TB_LEN],
            user_read: vec![0; TB_LEN],
            user_write: vec![0; TB_LEN],
            cached: Vec::with_capacity(TPAGES),
        }
    }

    /// Read-quadrant entry for the page of `v` in the given ring, zero when
    /// unmapped.
    #[inline(always)]
    pub fn read_entry(&self, user: bool, v: u32) -> u32 {
        let vpn = (v >> 12) as usize;
        if user {
            self.user_read[vpn]
        } else {
            self.kernel_read[vpn]
        }
    }

    /// Write-quadrant entry for the page of `v` in the given ring, zero when
    /// unmapped.
    #[inline(always)]
    pub fn write_entry(&self, user: bool, v: u32) -> u32 {
        let vpn = (v >> 12) as usize;
        if user {
            self.user_write[vpn]
        } else {
            self.kernel_write[vpn]
        }
    }

    /// Install a translation for the page of `v` onto the physical page of
    /// `p` (low flag bits of `p` are ignored) and return the encoded entry.
    ///
    /// Kernel-read is always granted; the other quadrants follow `writable`
    /// and `userable`. Inserting into a full side-list flushes everything
    /// first.
    pub fn install(&mut self, v: u32, p: u32, writable: bool, userable: bool) -> u32 {
        let e = ((v ^ p) & !0xFFFu32) | 1;
        let vpn = (v >> 12) as usize;
        if self.kernel_read[vpn] == 0 {
            if self.cached.len() >= TPAGES {
                self.flush();
            }
            self.cached.push(vpn as u32);
        }
        self.kernel_read[vpn] = e;
        self.kernel_write[vpn] = if writable { e } else { 0 };
        self.user_read[vpn] = if userable { e } else { 0 };
        self.user_write[vpn] = if userable && writable { e } else { 0 };
        e
    }

    /// Drop every cached translation. Idempotent, O(populated).
    pub fn flush(&mut self) {
        while let Some(vpn) = self.cached.pop() {
            let vpn = vpn as usize;
            self.kernel_read[vpn] = 0;
            self.kernel_write[vpn] = 0;
            self.user_read[vpn] = 0;
            self.user_write[vpn] = 0;
        }
    }

    #[cfg(test)]
    fn quadrants(&self, vpn: usize) -> [u32; 4] {
        [
            self.kernel_read[vpn],
            self.kernel_write[vpn],
            self.user_read[vpn],
            self.user_write[vpn],
        ]
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn entry_encoding_decodes_every_width() {
        let mut t = Tlb::new();
        // Virtual page 0x7000 backed by physical page 0x3000, PTE flags set.
        let e = t.install(0x7123, 0x3047, true, false);
        assert_eq!(e & 1, 1);
        assert_eq!(0x7123 ^ (e & !1), 0x3123); // byte
        assert_eq!((0x7122 ^ e) & !1u32, 0x3122); // half
        assert_eq!((0x7120 ^ e) & !3u32, 0x3120); // word
        assert_eq!((0x7120 ^ e) & !7u32, 0x3120); // double
    }

    #[test]
    fn quadrant_permissions() {
        let mut t = Tlb::new();
        t.install(0x1000, 0x1000, false, false);
        assert_ne!(t.read_entry(false, 0x1000), 0);
        assert_eq!(t.write_entry(false, 0x1000), 0);
        assert_eq!(t.read_entry(true, 0x1000), 0);

        t.install(0x2000, 0x2000, true, true);
        assert_ne!(t.write_entry(false, 0x2000), 0);
        assert_ne!(t.write_entry(true, 0x2000), 0);

        t.install(0x3000, 0x3000, false, true);
        assert_ne!(t.read_entry(true, 0x3000), 0);
        assert_eq!(t.write_entry(true, 0x3000), 0);
    }

    #[test]
    fn flush_clears_all_quadrants() {
        let mut t = Tlb::new();
        t.install(0x1000, 0x4000, true, true);
        t.install(0xFFFF_F000, 0x5000, true, false);
        t.flush();
        for v in [0x1000u32, 0xFFFF_F000] {
            assert_eq!(t.read_entry(false, v), 0);
            assert_eq!(t.write_entry(false, v), 0);
            assert_eq!(t.read_entry(true, v), 0);
            assert_eq!(t.write_entry(true, v), 0);
        }
        assert!(t.cached.is_empty());
        // Idempotent.
        t.flush();
        assert!(t.cached.is_empty());
    }

    #[test]
    fn reinstall_lists_vpn_once() {
        let mut t = Tlb::new();
        t.install(0x1000, 0x4000, false, false);
        t.install(0x1abc, 0x5000, true, true);
        assert_eq!(t.cached.len(), 1);
        assert_eq!(0x1abc ^ (t.read_entry(false, 0x1abc) & !1), 0x5abc);
    }

    #[test]
    fn full_side_list_flushes_before_insert() {
        let mut t = Tlb::new();
        for i in 0..TPAGES as u32 {
            t.install(i << 12, i << 12, true, true);
        }
        assert_eq!(t.cached.len(), TPAGES);
        t.install((TPAGES as u32) << 12, 0, true, true);
        assert_eq!(t.cached.len(), 1);
        assert_eq!(t.read_entry(false, 0x1000), 0);
        assert_ne!(t.read_entry(false, (TPAGES as u32) << 12), 0);
    }

    proptest! {
        // Any nonzero quadrant implies its VPN is listed, and every listed
        // VPN has a nonzero kernel-read quadrant.
        #[test]
        fn side_list_tracks_occupancy(
            pages in prop::collection::vec((0u32..64, 0u32..64, any::<bool>(), any::<bool>()), 1..32)
        ) {
            let mut t = Tlb::new();
            for &(vpn, ppn, w, u) in &pages {
                t.install(vpn << 12, ppn << 12, w, u);
            }
            for vpn in 0..64usize {
                let listed = t.cached.iter().any(|&c| c as usize == vpn);
                let occupied = t.quadrants(vpn).iter().any(|&e| e != 0);
                prop_assert_eq!(listed, occupied);
                if occupied {
                    prop_assert_ne!(t.kernel_read[vpn], 0);
                    prop_assert_eq!(t.cached.iter().filter(|&&c| c as usize == vpn).count(), 1);
                }
            }
            t.flush();
            for vpn in 0..64usize {
                prop_assert_eq!(t.quadrants(vpn), [0u32; 4]);
            }
        }
    }
}
