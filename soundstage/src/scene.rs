//! Scene traversal feeding sound positions.
//!
//! The host owns its scene graph and exposes it through [`SceneTraversal`].
//! [`SoundNodeVisitor`] accumulates translations while descending and records
//! where every sound node ends up.

use crate::math::Vec3;
use crate::sound::SoundId;

/// Callbacks issued while walking a scene.
pub trait SceneVisitor {
    /// Entering a node that offsets everything below it by `offset`.
    fn enter_transformation(&mut self, offset: Vec3);

    /// Leaving the innermost transformation node.
    fn leave_transformation(&mut self);

    fn visit_sound(&mut self, sound: SoundId);
}

/// Anything that can walk a visitor over its nodes.
pub trait SceneTraversal {
    fn accept(&self, visitor: &mut dyn SceneVisitor);
}

/// A minimal scene tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneNode {
    Group(Vec<SceneNode>),
    Transformation {
        offset: Vec3,
        children: Vec<SceneNode>,
    },
    Sound {
        sound: SoundId,
        children: Vec<SceneNode>,
    },
}

impl SceneNode {
    pub fn group(children: Vec<SceneNode>) -> Self {
        Self::Group(children)
    }

    pub fn translate(offset: Vec3, children: Vec<SceneNode>) -> Self {
        Self::Transformation { offset, children }
    }

    pub fn sound(sound: SoundId) -> Self {
        Self::Sound {
            sound,
            children: Vec::new(),
        }
    }
}

enum Step<'a> {
    Enter(&'a SceneNode),
    Leave,
}

impl SceneTraversal for SceneNode {
    /// Walks the tree depth-first with an explicit work stack.
    fn accept(&self, visitor: &mut dyn SceneVisitor) {
        let mut stack = vec![Step::Enter(self)];
        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Enter(node) => node,
                Step::Leave => {
                    visitor.leave_transformation();
                    continue;
                }
            };
            let children = match node {
                SceneNode::Group(children) => children,
                SceneNode::Transformation { offset, children } => {
                    visitor.enter_transformation(*offset);
                    stack.push(Step::Leave);
                    children
                }
                SceneNode::Sound { sound, children } => {
                    visitor.visit_sound(*sound);
                    children
                }
            };
            // Reversed so children are visited in declaration order.
            stack.extend(children.iter().rev().map(Step::Enter));
        }
    }
}

/// Collects the world position of every sound in a scene.
#[derive(Debug)]
pub struct SoundNodeVisitor {
    positions: Vec<Vec3>,
    placements: Vec<(SoundId, Vec3)>,
}

impl Default for SoundNodeVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundNodeVisitor {
    pub fn new() -> Self {
        Self {
            positions: vec![Vec3::ZERO],
            placements: Vec::new(),
        }
    }

    fn current(&self) -> Vec3 {
        self.positions.last().copied().unwrap_or(Vec3::ZERO)
    }

    pub fn placements(&self) -> &[(SoundId, Vec3)] {
        &self.placements
    }

    pub fn into_placements(self) -> Vec<(SoundId, Vec3)> {
        self.placements
    }
}

impl SceneVisitor for SoundNodeVisitor {
    fn enter_transformation(&mut self, offset: Vec3) {
        let position = self.current() + offset;
        self.positions.push(position);
    }

    fn leave_transformation(&mut self) {
        // The root entry is never popped.
        if self.positions.len() > 1 {
            self.positions.pop();
        }
    }

    fn visit_sound(&mut self, sound: SoundId) {
        let position = self.current();
        self.placements.push((sound, position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_translations_accumulate() {
        let a = SoundId::new(1);
        let b = SoundId::new(2);
        let c = SoundId::new(3);
        let scene = SceneNode::group(vec![
            SceneNode::translate(
                Vec3::new(1.0, 0.0, 0.0),
                vec![
                    SceneNode::sound(a),
                    SceneNode::translate(Vec3::new(0.0, 2.0, 0.0), vec![SceneNode::sound(b)]),
                ],
            ),
            SceneNode::sound(c),
        ]);

        let mut visitor = SoundNodeVisitor::new();
        scene.accept(&mut visitor);
        assert_eq!(
            visitor.placements(),
            &[
                (a, Vec3::new(1.0, 0.0, 0.0)),
                (b, Vec3::new(1.0, 2.0, 0.0)),
                (c, Vec3::ZERO),
            ]
        );
    }

    #[test]
    fn test_deep_tree_does_not_recurse() {
        let sound = SoundId::new(9);
        let mut node = SceneNode::sound(sound);
        for _ in 0..1_000 {
            node = SceneNode::translate(Vec3::X, vec![node]);
        }

        let mut visitor = SoundNodeVisitor::new();
        node.accept(&mut visitor);
        assert_eq!(visitor.placements(), &[(sound, Vec3::new(1_000.0, 0.0, 0.0))]);
    }
}
