///Returns true if `value` is a multiple of `alignment`. An alignment of 0 never matches.
pub fn is_aligned(value: u64, alignment: u64) -> bool {
    alignment != 0 && value % alignment == 0
}

///Number of mip levels of a full mip chain for a texture whose biggest axis is `max_extent`, i.e. `⌊log2(max_extent)⌋ + 1`.
///
/// Returns 0 for an extent of 0.
pub fn max_mip_levels(max_extent: u32) -> u32 {
    if max_extent == 0 {
        0
    } else {
        u32::BITS - max_extent.leading_zeros()
    }
}
