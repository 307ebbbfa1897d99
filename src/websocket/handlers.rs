//! Hooks the service layer calls to publish knowledge events

use std::sync::Arc;

use crate::models::{Incident, IncidentStatus, Lesson, Solution};

use super::{broadcaster::EventBroadcaster, messages::Event};

/// Incident lifecycle events
#[derive(Clone)]
pub struct IncidentEventHandler {
    broadcaster: Arc<EventBroadcaster>,
}

impl IncidentEventHandler {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { broadcaster }
    }

    pub fn on_incident_created(&self, incident: Incident) {
        self.broadcaster.publish(Event::IncidentCreated { incident });
    }

    /// `previous_status` is set only when the update changed the status
    pub fn on_incident_updated(&self, incident: Incident, previous_status: Option<IncidentStatus>) {
        self.broadcaster.publish(Event::IncidentUpdated {
            incident,
            previous_status,
        });
    }

    pub fn on_incident_deleted(&self, incident: Incident) {
        self.broadcaster.publish(Event::IncidentDeleted { incident });
    }
}

/// Solution and lesson events
#[derive(Clone)]
pub struct KnowledgeEventHandler {
    broadcaster: Arc<EventBroadcaster>,
}

impl KnowledgeEventHandler {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { broadcaster }
    }

    pub fn on_solution_added(&self, incident: Incident, solution: Solution) {
        self.broadcaster
            .publish(Event::SolutionAdded { incident, solution });
    }

    pub fn on_lessons_extracted(&self, incident: Incident, lessons: Vec<Lesson>) {
        if lessons.is_empty() {
            return;
        }
        self.broadcaster
            .publish(Event::LessonsExtracted { incident, lessons });
    }
}

/// All event handlers
#[derive(Clone)]
pub struct EventHandlers {
    pub incidents: IncidentEventHandler,
    pub knowledge: KnowledgeEventHandler,
}

impl EventHandlers {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            incidents: IncidentEventHandler::new(broadcaster.clone()),
            knowledge: KnowledgeEventHandler::new(broadcaster),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{generate_record_id, NewSolution, Severity};
    use crate::websocket::connection::ConnectionManager;
    use crate::websocket::messages::{test_support::incident, EventType};

    fn handlers() -> (EventHandlers, Arc<EventBroadcaster>) {
        let broadcaster = Arc::new(EventBroadcaster::new(Arc::new(ConnectionManager::new()), 16));
        (EventHandlers::new(broadcaster.clone()), broadcaster)
    }

    #[tokio::test]
    async fn test_incident_event_handler() {
        let (handlers, broadcaster) = handlers();
        let mut rx = broadcaster.subscribe();

        let incident = incident(Severity::High);
        handlers
            .incidents
            .on_incident_updated(incident.clone(), Some(IncidentStatus::Open));

        let envelope = rx.recv().await.unwrap();
        match envelope.event {
            Event::IncidentUpdated {
                incident: updated,
                previous_status,
            } => {
                assert_eq!(updated.id, incident.id);
                assert_eq!(previous_status, Some(IncidentStatus::Open));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_knowledge_event_handler() {
        let (handlers, broadcaster) = handlers();
        let mut rx = broadcaster.subscribe();

        let incident = incident(Severity::Low);
        let solution = Solution::from_new(
            generate_record_id(),
            NewSolution {
                incident_id: incident.id.clone(),
                title: "Restart consumers".to_string(),
                description: String::new(),
                steps: None,
                resources_needed: None,
                time_estimate: None,
                warnings: None,
                effectiveness: None,
            },
        );

        handlers.knowledge.on_lessons_extracted(incident.clone(), vec![]);
        handlers.knowledge.on_solution_added(incident, solution);

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.event_type(), EventType::SolutionAdded);
        assert_eq!(broadcaster.stats().total_events, 1);
    }
}
