use std::collections::HashSet;

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CreateProjectRequest, ProjectFilter, UpdateProjectRequest},
    repo_types::{Milestone, Project, ProjectStatus},
};
use crate::{
    error::AppError,
    state::AppState,
    users::{
        repo_types::{Role, User},
        services::load_user,
    },
};

pub const MAX_STUDENTS: usize = 3;
pub const DEFAULT_MILESTONES: [&str; 5] =
    ["Propuesta", "Capítulo 1", "Capítulo 2", "Capítulo 3", "Defensa"];

pub(crate) async fn load_project(st: &AppState, id: Uuid) -> Result<Project, AppError> {
    st.db
        .get_project(id)
        .await?
        .ok_or_else(|| AppError::not_found("Proyecto"))
}

pub fn can_view(user: &User, project: &Project) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Advisor => project.advisor_id == user.id,
        Role::Student => project.is_member(user.id),
    }
}

/// Loads a project the user is allowed to see.
pub async fn load_visible_project(
    st: &AppState,
    user: &User,
    id: Uuid,
) -> Result<Project, AppError> {
    let project = load_project(st, id).await?;
    if !can_view(user, &project) {
        warn!(user_id = %user.id, project_id = %id, "project access denied");
        return Err(AppError::forbidden());
    }
    Ok(project)
}

fn build_milestones(names: Option<Vec<String>>) -> Result<Vec<Milestone>, AppError> {
    let names: Vec<String> = match names {
        None => DEFAULT_MILESTONES.iter().map(|s| s.to_string()).collect(),
        Some(list) => list.into_iter().map(|n| n.trim().to_string()).collect(),
    };
    if names.is_empty() {
        return Err(AppError::validation("El proyecto debe tener al menos un hito"));
    }
    let mut seen = HashSet::new();
    for name in &names {
        if name.is_empty() {
            return Err(AppError::validation("Los hitos deben tener nombre"));
        }
        if !seen.insert(name.as_str()) {
            return Err(AppError::validation(format!("Hito duplicado: {name}")));
        }
    }
    Ok(names.into_iter().map(Milestone::new).collect())
}

/// Checks the shape of a creation request before touching the store.
fn validate_request(req: &CreateProjectRequest) -> Result<Uuid, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::validation("El título es obligatorio"));
    }
    let advisor_id = req
        .advisor_id
        .ok_or_else(|| AppError::validation("Debe asignar un asesor al proyecto"))?;
    if req.student_ids.is_empty() {
        return Err(AppError::validation(
            "Debe asignar al menos un estudiante al proyecto",
        ));
    }
    if req.student_ids.len() > MAX_STUDENTS {
        return Err(AppError::validation(format!(
            "Un proyecto admite como máximo {MAX_STUDENTS} estudiantes"
        )));
    }
    let distinct: HashSet<_> = req.student_ids.iter().collect();
    if distinct.len() != req.student_ids.len() {
        return Err(AppError::validation("Estudiantes repetidos en el proyecto"));
    }
    Ok(advisor_id)
}

pub async fn create_project(st: &AppState, req: CreateProjectRequest) -> Result<Project, AppError> {
    let advisor_id = validate_request(&req)?;

    let mut advisor = load_user(st, advisor_id).await?;
    if advisor.role != Role::Advisor || !advisor.can_sign_in() {
        return Err(AppError::validation("El asesor seleccionado no está habilitado"));
    }

    let mut students = Vec::with_capacity(req.student_ids.len());
    for id in &req.student_ids {
        let student = load_user(st, *id).await?;
        if student.role != Role::Student || !student.can_sign_in() {
            return Err(AppError::validation(format!(
                "{} no es un estudiante habilitado",
                student.display_name
            )));
        }
        if student.team_id.is_some() {
            return Err(AppError::Conflict(format!(
                "{} ya pertenece a otro proyecto",
                student.display_name
            )));
        }
        students.push(student);
    }

    let now = OffsetDateTime::now_utc();
    let project = Project {
        id: Uuid::new_v4(),
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        status: ProjectStatus::Pending,
        milestones: build_milestones(req.milestones)?,
        advisor_id,
        student_ids: req.student_ids,
        created_at: now,
        updated_at: now,
    };
    st.db.insert_project(&project).await?;

    // Not transactional: a failure below leaves the project with stale references.
    advisor.assigned_projects.push(project.id);
    st.db.save_user(&advisor).await?;
    for mut student in students {
        student.team_id = Some(project.id);
        st.db.save_user(&student).await?;
    }

    info!(project_id = %project.id, advisor_id = %advisor_id, students = project.student_ids.len(), "project created");
    Ok(project)
}

pub async fn list_projects(
    st: &AppState,
    user: &User,
    filter: &ProjectFilter,
) -> Result<Vec<Project>, AppError> {
    let q = filter
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    let mut projects: Vec<Project> = st
        .db
        .list_projects()
        .await?
        .into_iter()
        .filter(|p| can_view(user, p))
        .filter(|p| filter.status.map_or(true, |s| p.status == s))
        .filter(|p| q.as_ref().map_or(true, |q| p.title.to_lowercase().contains(q)))
        .collect();
    projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(projects)
}

pub async fn update_project(
    st: &AppState,
    id: Uuid,
    req: UpdateProjectRequest,
) -> Result<Project, AppError> {
    let mut project = load_project(st, id).await?;
    if let Some(title) = req.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::validation("El título es obligatorio"));
        }
        project.title = title.to_string();
    }
    if let Some(description) = req.description {
        project.description = description.trim().to_string();
    }
    if let Some(status) = req.status {
        if status != project.status {
            info!(project_id = %id, from = %project.status, to = %status, "project status changed");
            project.status = status;
        }
    }
    project.updated_at = OffsetDateTime::now_utc();
    st.db.save_project(&project).await?;
    Ok(project)
}

/// Removes a project and every reference to it.
pub async fn delete_project(st: &AppState, id: Uuid) -> Result<(), AppError> {
    let project = load_project(st, id).await?;

    match st.db.get_user(project.advisor_id).await? {
        Some(mut advisor) => {
            advisor.assigned_projects.retain(|p| *p != id);
            st.db.save_user(&advisor).await?;
        }
        None => warn!(project_id = %id, advisor_id = %project.advisor_id, "advisor missing"),
    }

    for student_id in &project.student_ids {
        let Some(mut student) = st.db.get_user(*student_id).await? else {
            warn!(project_id = %id, student_id = %student_id, "student missing");
            continue;
        };
        if student.team_id == Some(id) {
            student.team_id = None;
            st.db.save_user(&student).await?;
        }
    }

    let deliveries = st.db.list_deliveries(id).await?;
    for d in &deliveries {
        if let Err(e) = st.storage.delete_object(&d.s3_key).await {
            warn!(error = %e, key = %d.s3_key, "failed to delete delivery file");
        }
    }
    st.db.delete_deliveries(id).await?;
    st.db.delete_project(id).await?;

    info!(project_id = %id, deliveries = deliveries.len(), "project deleted");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::seed_project;
    use super::*;
    use crate::users::services::test_support::seed_user;

    fn request(advisor: Option<Uuid>, students: Vec<Uuid>) -> CreateProjectRequest {
        CreateProjectRequest {
            title: "Redes neuronales para cultivos".into(),
            description: "".into(),
            advisor_id: advisor,
            student_ids: students,
            milestones: None,
        }
    }

    #[tokio::test]
    async fn rejects_zero_students() {
        let st = AppState::fake();
        let advisor = seed_user(&st, "Asesor", Role::Advisor).await;
        let err = create_project(&st, request(Some(advisor.id), vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(st.db.list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_more_than_three_students() {
        let st = AppState::fake();
        let advisor = seed_user(&st, "Asesor", Role::Advisor).await;
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D"] {
            ids.push(seed_user(&st, name, Role::Student).await.id);
        }
        let err = create_project(&st, request(Some(advisor.id), ids))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(st.db.list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_missing_advisor() {
        let st = AppState::fake();
        let student = seed_user(&st, "A", Role::Student).await;
        let err = create_project(&st, request(None, vec![student.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_non_advisor_and_taken_student() {
        let st = AppState::fake();
        let not_advisor = seed_user(&st, "Falso", Role::Student).await;
        let student = seed_user(&st, "A", Role::Student).await;
        let err = create_project(&st, request(Some(not_advisor.id), vec![student.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let team = seed_project(&st, 1, &["Único"]).await;
        let err = create_project(
            &st,
            request(Some(team.advisor.id), vec![team.students[0].id]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_links_advisor_and_students() {
        let st = AppState::fake();
        let advisor = seed_user(&st, "Asesor", Role::Advisor).await;
        let a = seed_user(&st, "A", Role::Student).await;
        let b = seed_user(&st, "B", Role::Student).await;

        let project = create_project(&st, request(Some(advisor.id), vec![a.id, b.id]))
            .await
            .unwrap();
        assert_eq!(project.status, ProjectStatus::Pending);
        let names: Vec<_> = project.milestones.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, DEFAULT_MILESTONES);
        assert!(project.milestones.iter().all(|m| !m.completed));

        let advisor = st.db.get_user(advisor.id).await.unwrap().unwrap();
        assert_eq!(advisor.assigned_projects, vec![project.id]);
        for id in [a.id, b.id] {
            let s = st.db.get_user(id).await.unwrap().unwrap();
            assert_eq!(s.team_id, Some(project.id));
        }
    }

    #[tokio::test]
    async fn duplicate_milestone_names_rejected() {
        let st = AppState::fake();
        let advisor = seed_user(&st, "Asesor", Role::Advisor).await;
        let a = seed_user(&st, "A", Role::Student).await;
        let mut req = request(Some(advisor.id), vec![a.id]);
        req.milestones = Some(vec!["Capítulo 1".into(), " Capítulo 1 ".into()]);
        assert!(matches!(
            create_project(&st, req).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn delete_clears_assignments_and_teams() {
        use crate::deliveries::{
            dto::{ReviewDecision, ReviewRequest},
            services::{review_delivery, submit_delivery, Submission, UploadItem},
        };

        let (st, storage) = AppState::fake_with_storage();
        let team = seed_project(&st, 3, &["Propuesta"]).await;
        let draft = || Submission {
            milestone: "Propuesta".into(),
            note: None,
            file: UploadItem {
                body: bytes::Bytes::from_static(b"%PDF-1.7 propuesta"),
                content_type: "application/pdf".into(),
                file_name: "propuesta.pdf".into(),
            },
        };
        let v1 = submit_delivery(&st, &team.students[0], team.project.id, draft())
            .await
            .unwrap();
        review_delivery(
            &st,
            &team.advisor,
            v1.id,
            ReviewRequest {
                decision: ReviewDecision::Reject,
                comment: Some("Ampliar objetivos".into()),
            },
        )
        .await
        .unwrap();
        let v2 = submit_delivery(&st, &team.students[1], team.project.id, draft())
            .await
            .unwrap();
        assert_eq!(storage.keys().len(), 2);

        delete_project(&st, team.project.id).await.unwrap();

        let advisor = st.db.get_user(team.advisor.id).await.unwrap().unwrap();
        assert!(advisor.assigned_projects.is_empty());
        for s in &team.students {
            let s = st.db.get_user(s.id).await.unwrap().unwrap();
            assert_eq!(s.team_id, None);
        }
        assert!(st.db.get_project(team.project.id).await.unwrap().is_none());
        assert!(st.db.list_deliveries(team.project.id).await.unwrap().is_empty());
        assert!(st.db.get_delivery(v2.id).await.unwrap().is_none());
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn delete_keeps_other_advisor_assignments() {
        let st = AppState::fake();
        let first = seed_project(&st, 1, &["Propuesta"]).await;
        let extra = seed_user(&st, "Extra", Role::Student).await;
        let second = create_project(&st, request(Some(first.advisor.id), vec![extra.id]))
            .await
            .unwrap();

        delete_project(&st, first.project.id).await.unwrap();
        let advisor = st.db.get_user(first.advisor.id).await.unwrap().unwrap();
        assert_eq!(advisor.assigned_projects, vec![second.id]);
    }

    #[tokio::test]
    async fn visibility_follows_role() {
        let st = AppState::fake();
        let admin = seed_user(&st, "Admin", Role::Admin).await;
        let mine = seed_project(&st, 1, &["Propuesta"]).await;
        let other = seed_project(&st, 1, &["Propuesta"]).await;

        let all = list_projects(&st, &admin, &ProjectFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let advisor_view = list_projects(&st, &mine.advisor, &ProjectFilter::default())
            .await
            .unwrap();
        assert_eq!(advisor_view.len(), 1);
        assert_eq!(advisor_view[0].id, mine.project.id);

        let err = load_visible_project(&st, &mine.students[0], other.project.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn update_changes_status_and_rejects_blank_title() {
        let st = AppState::fake();
        let team = seed_project(&st, 1, &["Propuesta"]).await;
        let updated = update_project(
            &st,
            team.project.id,
            UpdateProjectRequest {
                status: Some(ProjectStatus::Suspended),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, ProjectStatus::Suspended);

        let err = update_project(
            &st,
            team.project.id,
            UpdateProjectRequest {
                title: Some("   ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
