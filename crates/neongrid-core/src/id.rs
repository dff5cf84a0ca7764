use slotmap::new_key_type;

new_key_type! {
    /// Identifies an entity (source, pylon, load, or battery) in the grid.
    pub struct EntityId;

    /// Identifies a wire between two entities.
    pub struct LinkId;
}
