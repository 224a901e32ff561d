//! The set of live buffers, looked up by name or by backing path.

#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: Vec<crate::buffer::EditBuffer>,
}

impl BufferRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Every registered buffer, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &crate::buffer::EditBuffer> {
        self.buffers.iter()
    }

    /// Buffers a user-facing list should show, which leaves out
    /// system ones.
    pub fn listed(&self) -> impl Iterator<Item = &crate::buffer::EditBuffer> {
        self.buffers.iter().filter(|buffer| !buffer.system())
    }

    /// Registers a fresh buffer under `name`, suffixing `<2>`, `<3>`
    /// and so on if the name is already taken.
    pub fn create(&mut self, name: &str) -> &mut crate::buffer::EditBuffer {
        let unique = self.unique_name(name);

        log::debug!("new buffer '{unique}'");

        self.buffers.push(crate::buffer::EditBuffer::new(&unique));
        self.buffers
            .last_mut()
            .expect("a buffer was just registered")
    }

    fn unique_name(&self, name: &str) -> String {
        if self.find(name).is_none() {
            return name.to_owned();
        }

        let mut suffix = 2u32;

        loop {
            let candidate = format!("{name}<{suffix}>");

            if self.find(&candidate).is_none() {
                return candidate;
            }

            suffix += 1;
        }
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&crate::buffer::EditBuffer> {
        self.buffers.iter().find(|buffer| buffer.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut crate::buffer::EditBuffer> {
        self.buffers.iter_mut().find(|buffer| buffer.name() == name)
    }

    /// The buffer loaded from `path`, if any; used to avoid loading a
    /// file twice.
    #[must_use]
    pub fn find_by_path(&self, path: &std::path::Path) -> Option<&crate::buffer::EditBuffer> {
        self.buffers.iter().find(|buffer| buffer.path() == Some(path))
    }

    /// Closes and drops the named buffer. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.buffers.iter().position(|buffer| buffer.name() == name) else {
            return false;
        };

        log::debug!("closing buffer '{name}'");

        self.buffers[index].close();
        self.buffers.remove(index);

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_made_unique() {
        let mut registry = BufferRegistry::new();

        registry.create("notes");
        registry.create("notes");
        registry.create("notes");

        assert!(registry.find("notes").is_some());
        assert!(registry.find("notes<2>").is_some());
        assert!(registry.find("notes<3>").is_some());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn find_mut_edits_the_registered_buffer() {
        let mut registry = BufferRegistry::new();

        registry.create("scratch");
        registry
            .find_mut("scratch")
            .unwrap()
            .insert(0, b"content")
            .unwrap();

        assert_eq!(registry.find("scratch").unwrap().total_size(), 7);
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn lookup_by_backing_path() {
        let mut registry = BufferRegistry::new();
        let path = std::path::PathBuf::from("/tmp/some-file.txt");

        registry.create("a");
        registry
            .find_mut("a")
            .unwrap()
            .set_path(Some(path.clone()));
        registry.create("b");

        assert_eq!(registry.find_by_path(&path).unwrap().name(), "a");
        assert!(registry
            .find_by_path(std::path::Path::new("/tmp/other.txt"))
            .is_none());
    }

    #[test]
    fn remove_closes_and_forgets() {
        let mut registry = BufferRegistry::new();

        registry.create("gone");

        assert!(registry.remove("gone"));
        assert!(!registry.remove("gone"));
        assert!(registry.is_empty());
    }

    #[test]
    fn system_buffers_are_not_listed() {
        let mut registry = BufferRegistry::new();

        registry.create("visible");
        registry.create("*internal*").set_system(true);

        let listed: Vec<&str> = registry.listed().map(|buffer| buffer.name()).collect();

        assert_eq!(listed, vec!["visible"]);
        assert_eq!(registry.iter().count(), 2);
    }
}
