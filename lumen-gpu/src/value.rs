use bytemuck::Pod;
use lumen_rhi::ImageData;

/// One buffered instance of a variable's data.
///
/// Writes only touch the CPU copy and mark the value dirty; the next sync copies it to the GPU once.
#[derive(Debug, Clone, Default)]
pub struct Value {
    data: Vec<u8>,
    image: Option<ImageData>,
    dirty: bool,
}

impl Value {
    /// Replace the content with `bytes`.
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.dirty = true;
    }

    /// Replace the content with the raw bytes of `items`.
    pub fn set_from<T: Pod>(&mut self, items: &[T]) {
        self.copy_from_bytes(bytemuck::cast_slice(items));
    }

    /// Replace the image of a texture value.
    pub fn set_image(&mut self, image: ImageData) {
        self.image = Some(image);
        self.dirty = true;
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy the content out as `T`s. A trailing partial element is zero-filled.
    pub fn read<T: Pod>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.data)
    }

    #[inline]
    pub fn image(&self) -> Option<&ImageData> {
        self.image.as_ref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the content changed since the last sync.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}
