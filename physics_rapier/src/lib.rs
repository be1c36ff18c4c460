//! Rapier world wrapper shared by the character crates.
#![forbid(unsafe_code)]

use rapier3d::prelude::*;

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    /// Unit vector opposing gravity, or world Y when gravity is degenerate.
    pub fn up(&self) -> Vector<Real> {
        if self.gravity.norm_squared() > 1.0e-6 {
            -self.gravity.normalize()
        } else {
            Vector::y()
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut RigidBodySet {
        &mut self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn colliders_mut(&mut self) -> &mut ColliderSet {
        &mut self.colliders
    }

    pub fn query_pipeline(&self) -> &QueryPipeline {
        &self.query_pipeline
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &physics_hooks,
            &event_handler,
        );
        self.query_pipeline.update(&self.colliders);
    }

    /// Refreshes the query pipeline without advancing the simulation. Needed
    /// after inserting colliders when the host has not stepped yet.
    pub fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    pub fn insert_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.colliders.insert(collider)
    }

    pub fn insert_dynamic_body(
        &mut self,
        body: RigidBodyBuilder,
        collider: ColliderBuilder,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body_handle = self.bodies.insert(body.build());
        let collider_handle =
            self.colliders
                .insert_with_parent(collider.build(), body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    /// Inserts a velocity-driven kinematic body, the shape moving platforms
    /// and character bodies use.
    pub fn insert_kinematic_body(
        &mut self,
        body: RigidBodyBuilder,
        collider: ColliderBuilder,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body_handle = self.bodies.insert(body.build());
        let collider_handle =
            self.colliders
                .insert_with_parent(collider.build(), body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_floor(world: &mut PhysicsWorld) {
        let floor = ColliderBuilder::cuboid(5.0, 0.1, 5.0)
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        world.insert_static_collider(floor);
    }

    #[test]
    fn up_opposes_gravity() {
        let world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        assert!((world.up() - vector![0.0, 1.0, 0.0]).norm() < 1.0e-6);

        let degenerate = PhysicsWorld::new(Vector::zeros());
        assert!((degenerate.up() - vector![0.0, 1.0, 0.0]).norm() < 1.0e-6);
    }

    #[test]
    fn dynamic_body_falls_onto_floor() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        let (handle, _) = world.insert_dynamic_body(
            RigidBodyBuilder::dynamic().translation(vector![0.0, 2.0, 0.0]),
            ColliderBuilder::ball(0.5),
        );
        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }
        let body = world.body(handle).expect("body still present");
        assert!(body.translation().y < 1.0);
        assert!(body.translation().y > 0.0);
    }

    #[test]
    fn kinematic_body_integrates_velocity() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let (handle, _) = world.insert_kinematic_body(
            RigidBodyBuilder::kinematic_velocity_based().translation(vector![0.0, 1.0, 0.0]),
            ColliderBuilder::cuboid(1.0, 0.1, 1.0),
        );
        world
            .body_mut(handle)
            .expect("platform present")
            .set_linvel(vector![1.0, 0.0, 0.0], true);
        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        let body = world.body(handle).expect("platform still present");
        assert!((body.translation().x - 1.0).abs() < 0.05);
    }
}
