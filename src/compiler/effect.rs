//! Composition of effect trees

/// An effect that may be a pure sequencing node
///
/// Sequences are associative: `do([do([a, b]), c])` and `do([a, b, c])` mean the same thing.
/// Lowering uses [`lower_sequence`] to keep nested sequences from piling up.
pub trait Composable: Sized {
    /// The children of a sequencing node, `None` for any other effect
    fn subeffects(&self) -> Option<&[Self]>;

    /// Consumes a sequencing node into its children, or returns any other effect unchanged
    fn into_subeffects(self) -> Result<Vec<Self>, Self>;

    /// Builds a sequencing node
    fn sequence(effects: Vec<Self>) -> Self;

    /// Replaces nested sequences by their children, one level deep
    fn flattened(self) -> Self {
        match self.into_subeffects() {
            Ok(children) => Self::sequence(flatten(children)),
            Err(effect) => effect,
        }
    }
}

/// Concatenates the children of sequencing nodes among `effects`
pub fn flatten<E: Composable>(effects: Vec<E>) -> Vec<E> {
    let mut flattened = Vec::with_capacity(effects.len());
    for effect in effects {
        match effect.into_subeffects() {
            Ok(children) => flattened.extend(children),
            Err(effect) => flattened.push(effect),
        }
    }
    flattened
}

/// Lowers the children of a sequence left to right, then flattens the result one level
///
/// Every child sees the context mutations of its earlier siblings.
pub fn lower_sequence<S, T, C, E>(
    effects: Vec<S>,
    context: &mut C,
    mut lower: impl FnMut(S, &mut C) -> Result<T, E>,
) -> Result<T, E>
where
    T: Composable,
{
    let mut lowered = Vec::with_capacity(effects.len());
    for effect in effects {
        lowered.push(lower(effect, context)?);
    }
    Ok(T::sequence(flatten(lowered)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Tree {
        Do(Vec<Tree>),
        Leaf(u32),
    }

    impl Composable for Tree {
        fn subeffects(&self) -> Option<&[Self]> {
            match self {
                Tree::Do(children) => Some(children),
                Tree::Leaf(_) => None,
            }
        }

        fn into_subeffects(self) -> Result<Vec<Self>, Self> {
            match self {
                Tree::Do(children) => Ok(children),
                other => Err(other),
            }
        }

        fn sequence(effects: Vec<Self>) -> Self {
            Tree::Do(effects)
        }
    }

    #[test]
    fn test_flatten_one_level() {
        let tree = Tree::Do(vec![
            Tree::Do(vec![Tree::Leaf(1), Tree::Do(vec![Tree::Leaf(2)])]),
            Tree::Leaf(3),
        ]);
        assert_eq!(
            tree.flattened(),
            Tree::Do(vec![Tree::Leaf(1), Tree::Do(vec![Tree::Leaf(2)]), Tree::Leaf(3)])
        );
    }

    #[test]
    fn test_lower_sequence_threads_context() {
        let mut counter = 0;
        let lowered: Result<Tree, ()> = lower_sequence(
            vec![10, 20],
            &mut counter,
            |n, counter: &mut u32| {
                *counter += 1;
                Ok(Tree::Do(vec![Tree::Leaf(n + *counter), Tree::Leaf(0)]))
            },
        );
        assert_eq!(
            lowered.unwrap(),
            Tree::Do(vec![Tree::Leaf(11), Tree::Leaf(0), Tree::Leaf(22), Tree::Leaf(0)])
        );
    }
}
