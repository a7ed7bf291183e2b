/// Lazily compiled static regex for literal patterns.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a [`Contributor`](crate::Contributor) from optional hook bodies.
///
/// ```ignore
/// contributor! {
///     name: "answer",
///     test: |test, query| {
///         if let Some(answer) = &test.answer {
///             query.push(Clause::Equals { field: Field::Answer, value: answer.clone() });
///         }
///         Ok(())
///     },
/// }
/// ```
///
/// Every hook closure is `move`; clone captured values per hook when more than
/// one hook needs them.
#[macro_export]
macro_rules! contributor {
    (
        name: $name:expr
        $(, before_search: |$opts:ident, $draft:ident| $before:block)?
        $(, test: |$test:ident, $query:ident| $compile:block)?
        $(, modify: |$request:ident, $dialogue:ident| $modify:block)?
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut contributor = $crate::Contributor::named($name);
        $(
            contributor.before_search =
                Some(Box::new(move |$opts: &$crate::QaOptions, $draft: &mut $crate::DialogueTest| $before));
        )?
        $(
            contributor.test = Some(Box::new(
                move |$test: &$crate::DialogueTest,
                      $query: &mut $crate::Query|
                      -> ::std::result::Result<(), $crate::ValidationError> { $compile },
            ));
        )?
        $(
            contributor.modify =
                Some(Box::new(move |$request: &$crate::ModifyRequest, $dialogue: &mut $crate::Dialogue| $modify));
        )?
        contributor
    }};
}
