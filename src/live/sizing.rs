use crate::{live::MapDefinition, map};

/// Blocks on each side of the centre of a hash query.
const WINDOW_RADIUS: i64 = 2;

/// Block ids reported by one hash query.
pub const WINDOW_LEN: usize = 25;

/// The extents of one live map, in tiles.
///
/// `size` is what the files on disk are indexed by. `wrap` is the smaller,
/// virtual extent the server lets players walk in; queries centred inside of
/// it wrap around its edges and are numbered with its height instead of the
/// physical one.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MapSizing {
    pub size: (u16, u16),
    pub wrap: (u16, u16),
}

impl MapSizing {
    /// Clamps a declared size to the default size of `map`, and the wrap size to the result.
    #[must_use]
    pub fn new(map: u8, declared: (u16, u16), wrap: (u16, u16)) -> Self {
        let default = map::default_size(map.into());
        let size = (declared.0.min(default.0), declared.1.min(default.1));
        Self {
            size,
            wrap: (wrap.0.min(size.0), wrap.1.min(size.1)),
        }
    }

    #[must_use]
    pub fn from_definition(definition: &MapDefinition) -> Self {
        Self::new(
            definition.map,
            (definition.width, definition.height),
            (definition.wrap_width, definition.wrap_height),
        )
    }

    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.width_in_blocks() * self.height_in_blocks()
    }

    #[must_use]
    pub fn contains(&self, block: u32) -> bool {
        block < self.block_count()
    }

    #[must_use]
    pub fn height_in_blocks(&self) -> u32 {
        u32::from(self.size.1 >> 3)
    }

    #[must_use]
    pub fn width_in_blocks(&self) -> u32 {
        u32::from(self.size.0 >> 3)
    }

    /// The blocks around `block`, ordered `(dx + 2) * 5 + (dy + 2)`.
    ///
    /// On each axis, a centre inside the wrap wraps at the wrap size and the
    /// ids are numbered `x * wrap_height + y`; otherwise the physical size is
    /// used. Ids past the physical block count are `None`, as is every slot
    /// when `block` itself is out of range.
    #[must_use]
    pub fn window(&self, block: u32) -> [Option<u32>; WINDOW_LEN] {
        let mut window = [None; WINDOW_LEN];
        if !self.contains(block) {
            return window;
        }

        let width = i64::from(self.width_in_blocks());
        let height = i64::from(self.height_in_blocks());
        let (x, y) = (i64::from(block) / height, i64::from(block) % height);
        let wrap_width = i64::from(self.wrap.0 >> 3);
        let wrap_height = i64::from(self.wrap.1 >> 3);
        let extent_x = if x < wrap_width { wrap_width } else { width };
        let extent_y = if y < wrap_height { wrap_height } else { height };

        let offsets = -WINDOW_RADIUS..=WINDOW_RADIUS;
        let cells = offsets
            .clone()
            .flat_map(|dx| offsets.clone().map(move |dy| (dx, dy)));
        let count = width * height;
        for (slot, (dx, dy)) in window.iter_mut().zip(cells) {
            let wrapped_x = (x + dx).rem_euclid(extent_x);
            let wrapped_y = (y + dy).rem_euclid(extent_y);
            let id = wrapped_x * extent_y + wrapped_y;
            if id < count {
                *slot = u32::try_from(id).ok();
            }
        }
        window
    }
}
