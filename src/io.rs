//! Platform collaborator seam: register access, cache maintenance, delay.

/// Host platform primitives the protocol layer is built on.
///
/// Register accesses are byte offsets from the controller base. Cache
/// maintenance must cover at least the given range; `flush_range` makes
/// CPU writes visible to the DMA engine, `invalidate_range` makes device
/// writes visible to the CPU.
pub trait HostIo {
    fn read_reg8(&self, offset: u32) -> u8;
    fn read_reg16(&self, offset: u32) -> u16;
    fn read_reg32(&self, offset: u32) -> u32;
    fn write_reg8(&self, offset: u32, value: u8);
    fn write_reg16(&self, offset: u32, value: u16);
    fn write_reg32(&self, offset: u32, value: u32);

    fn flush_range(&self, addr: usize, len: usize);
    fn invalidate_range(&self, addr: usize, len: usize);

    fn delay_us(&self, us: u32);
}

impl<T: HostIo> HostIo for &T {
    fn read_reg8(&self, offset: u32) -> u8 {
        (**self).read_reg8(offset)
    }

    fn read_reg16(&self, offset: u32) -> u16 {
        (**self).read_reg16(offset)
    }

    fn read_reg32(&self, offset: u32) -> u32 {
        (**self).read_reg32(offset)
    }

    fn write_reg8(&self, offset: u32, value: u8) {
        (**self).write_reg8(offset, value)
    }

    fn write_reg16(&self, offset: u32, value: u16) {
        (**self).write_reg16(offset, value)
    }

    fn write_reg32(&self, offset: u32, value: u32) {
        (**self).write_reg32(offset, value)
    }

    fn flush_range(&self, addr: usize, len: usize) {
        (**self).flush_range(addr, len)
    }

    fn invalidate_range(&self, addr: usize, len: usize) {
        (**self).invalidate_range(addr, len)
    }

    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }
}

/// Generates the volatile MMIO register accessors of [`HostIo`] for a
/// platform struct with a `usize` base-address field. The platform still
/// implements cache maintenance and delay by hand.
#[macro_export]
macro_rules! impl_mmio_register_ops {
    ($struct_name:ident, $field_name:ident) => {
        impl $struct_name {
            #[inline]
            pub fn read_reg8(&self, offset: u32) -> u8 {
                unsafe {
                    core::ptr::read_volatile((self.$field_name + offset as usize) as *const u8)
                }
            }

            #[inline]
            pub fn read_reg16(&self, offset: u32) -> u16 {
                unsafe {
                    core::ptr::read_volatile((self.$field_name + offset as usize) as *const u16)
                }
            }

            #[inline]
            pub fn read_reg32(&self, offset: u32) -> u32 {
                unsafe {
                    core::ptr::read_volatile((self.$field_name + offset as usize) as *const u32)
                }
            }

            #[inline]
            pub fn write_reg8(&self, offset: u32, value: u8) {
                unsafe {
                    core::ptr::write_volatile(
                        (self.$field_name + offset as usize) as *mut u8,
                        value,
                    )
                }
            }

            #[inline]
            pub fn write_reg16(&self, offset: u32, value: u16) {
                unsafe {
                    core::ptr::write_volatile(
                        (self.$field_name + offset as usize) as *mut u16,
                        value,
                    )
                }
            }

            #[inline]
            pub fn write_reg32(&self, offset: u32, value: u32) {
                unsafe {
                    core::ptr::write_volatile(
                        (self.$field_name + offset as usize) as *mut u32,
                        value,
                    )
                }
            }
        }
    };
}

/// DMA-target scratch buffer aligned to a cache-line boundary.
#[repr(C, align(32))]
pub struct DmaBuffer<const N: usize>(pub [u8; N]);

impl<const N: usize> DmaBuffer<N> {
    pub const fn new() -> Self {
        Self([0u8; N])
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Address for ranges the device writes into.
    #[inline]
    pub fn addr_mut(&mut self) -> usize {
        self.0.as_mut_ptr() as usize
    }
}

impl<const N: usize> Default for DmaBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
