use std::{fmt, marker::PhantomData};

/// A typed handle on one field of document type `T` holding values of type `V`.
///
/// Handles are declared once, next to the document type, and used wherever the typed builder
/// overloads take a field:
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     name: String,
///     age: i32,
/// }
///
/// impl User {
///     const NAME: Field<User, String> = Field::new("name");
///     const AGE: Field<User, i32> = Field::new("age");
/// }
///
/// accessor.add_search_filter_on(User::AGE, &30, Comparison::GreaterOrEquals);
/// ```
pub struct Field<T, V> {
    path: &'static str,
    _marker: PhantomData<fn(&T) -> V>,
}

impl<T, V> Field<T, V> {
    pub const fn new(path: &'static str) -> Self {
        Self { path, _marker: PhantomData }
    }

    /// The dotted path of the field inside the stored document.
    pub fn path(&self) -> &'static str {
        self.path
    }
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.path).finish()
    }
}
